mod cli;

use sceneloom::{
    client,
    config::{self, Config},
    pipeline::VariantKind,
    runner::{self, Runner},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Read;
use std::path::Path;

/// Exit status for a run that finished with failed scenes.
const EXIT_SCENES_FAILED: i32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "sceneloom=debug,sceneloom_workflow=debug".to_string()
        } else {
            "sceneloom=info,sceneloom_workflow=info".to_string()
        }
    });

    // stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenes,
            variant,
            url,
            concurrency,
            poll_interval,
            max_attempts,
            output_dir,
            suffix,
            random_suffix,
            run_timeout,
            trigger,
            report,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(variant) = variant {
                config.pipeline.variant = variant;
            }
            if let Some(url) = url {
                config.remote.url = url;
            }
            if let Some(concurrency) = concurrency {
                config.orchestrator.concurrency = concurrency;
            }
            if let Some(interval) = poll_interval {
                config.retry.poll_interval_secs = interval;
            }
            if let Some(max_attempts) = max_attempts {
                config.retry.max_attempts = max_attempts;
            }
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            if suffix.is_some() {
                config.output.suffix = suffix;
            }
            if random_suffix {
                config.output.random_suffix = true;
            }
            if run_timeout.is_some() {
                config.orchestrator.run_timeout_secs = run_timeout;
            }
            config::validate_config(&config).context("Invalid settings")?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_scenes(config, &scenes, trigger, report.as_deref()))
        }
        Commands::Validate { scenes, variant } => {
            validate_scenes(&scenes, variant, cli.config.as_deref())
        }
        Commands::Concat {
            input,
            path,
            delimiter,
            placeholder,
        } => concat(&input, &path, &delimiter, &placeholder),
        Commands::ShowConfig => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            print!("{}", config::to_toml(&config)?);
            Ok(())
        }
        Commands::Version => {
            println!("sceneloom {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read scenes from stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

async fn run_scenes(
    config: Config,
    scenes: &Path,
    trigger: Option<i64>,
    report_path: Option<&Path>,
) -> Result<()> {
    let raw = read_input(scenes)?;

    let client = client::from_config(&config.remote);
    let mut runner = Runner::new(config, client);
    if let Some(trigger) = trigger {
        runner = runner.with_trigger(trigger);
    }

    let report = runner.run(&raw).await;
    let json = serde_json::to_string_pretty(&report)?;

    match report_path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            tracing::info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    if !report.success {
        std::process::exit(EXIT_SCENES_FAILED);
    }
    Ok(())
}

fn validate_scenes(
    scenes: &Path,
    variant: Option<VariantKind>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(variant) = variant {
        config.pipeline.variant = variant;
    }

    let raw = read_input(scenes)?;
    let parsed = runner::check(&config, &raw)?;

    println!(
        "✓ {} scenes valid for variant {}",
        parsed.len(),
        config.pipeline.variant
    );
    for scene in &parsed {
        println!("  scene {}: {:.2}s - {:.2}s", scene.id, scene.start, scene.end);
    }

    Ok(())
}

fn concat(input: &Path, path: &str, delimiter: &str, placeholder: &str) -> Result<()> {
    let raw = read_input(input)?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{:?} is not valid JSON", input))?;

    let joined = sceneloom_workflow::concat_by_path(&document, path, delimiter, placeholder)?;
    println!("{}", joined);
    Ok(())
}
