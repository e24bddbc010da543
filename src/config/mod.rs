mod types;

pub use types::*;

use crate::pipeline::PipelineVariant;
use anyhow::{Context, Result};
use std::path::Path;

/// Longest accepted wait between polls: one day.
pub const MAX_POLL_INTERVAL_SECS: f64 = 86_400.0;

/// Longest accepted run timeout: thirty days.
pub const MAX_RUN_TIMEOUT_SECS: f64 = 30.0 * 86_400.0;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./sceneloom.toml", "~/.config/sceneloom/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Render the effective configuration as TOML
pub fn to_toml(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.remote.url.trim().is_empty() {
        anyhow::bail!("remote.url cannot be empty");
    }

    if !(1..=20).contains(&config.orchestrator.concurrency) {
        anyhow::bail!(
            "orchestrator.concurrency must be between 1 and 20, got {}",
            config.orchestrator.concurrency
        );
    }

    if let Some(timeout) = config.orchestrator.run_timeout_secs {
        if !(timeout.is_finite() && timeout > 0.0) {
            anyhow::bail!("orchestrator.run_timeout_secs must be positive");
        }
        if timeout > MAX_RUN_TIMEOUT_SECS {
            anyhow::bail!(
                "orchestrator.run_timeout_secs must be at most {}, got {}",
                MAX_RUN_TIMEOUT_SECS,
                timeout
            );
        }
    }

    let interval = config.retry.poll_interval_secs;
    if !(interval.is_finite() && interval > 0.0) {
        anyhow::bail!("retry.poll_interval_secs must be positive");
    }
    if interval > MAX_POLL_INTERVAL_SECS {
        anyhow::bail!(
            "retry.poll_interval_secs must be at most {}, got {}",
            MAX_POLL_INTERVAL_SECS,
            interval
        );
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts cannot be 0");
    }

    if !(config.pipeline.default_fps.is_finite() && config.pipeline.default_fps > 0.0) {
        anyhow::bail!("pipeline.default_fps must be positive");
    }

    if config.output.random_suffix && config.output.suffix.is_some() {
        tracing::warn!("output.suffix is ignored because output.random_suffix is set");
    }

    // Resolving the variant checks custom stage tables and template names.
    PipelineVariant::from_config(&config.pipeline)?;

    Ok(())
}
