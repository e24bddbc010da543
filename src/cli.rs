use clap::{Parser, Subcommand};
use sceneloom::pipeline::VariantKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sceneloom")]
#[command(author, version, about = "Scene job orchestrator for ComfyUI-style generation services")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate every scene in a JSON file and print the report
    Run {
        /// Scene list (JSON array); `-` reads stdin
        #[arg(required = true)]
        scenes: PathBuf,

        /// Pipeline variant
        #[arg(long, value_enum)]
        variant: Option<VariantKind>,

        /// Base URL of the generation service
        #[arg(long)]
        url: Option<String>,

        /// Maximum scenes in flight (1-20)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Seconds between polls
        #[arg(long)]
        poll_interval: Option<f64>,

        /// Poll attempts per stage before giving up
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Base output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Write into `<output-dir>/video_<suffix>`
        #[arg(long, conflicts_with = "random_suffix")]
        suffix: Option<String>,

        /// Write into `<output-dir>/video_<random>`
        #[arg(long)]
        random_suffix: bool,

        /// Stop dispatching new scenes after this many seconds
        #[arg(long)]
        run_timeout: Option<f64>,

        /// External trigger value, recorded in the logs
        #[arg(long)]
        trigger: Option<i64>,

        /// Write the report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check a scene file against a variant without submitting anything
    Validate {
        /// Scene list (JSON array)
        #[arg(required = true)]
        scenes: PathBuf,

        /// Pipeline variant
        #[arg(long, value_enum)]
        variant: Option<VariantKind>,
    },

    /// Join one field from every element of a JSON array
    Concat {
        /// JSON file holding an array
        #[arg(required = true)]
        input: PathBuf,

        /// Dot-separated path to the field, e.g. `meta.prompt`
        #[arg(short, long)]
        path: String,

        /// Separator placed between values
        #[arg(short, long, default_value = ", ")]
        delimiter: String,

        /// Used for elements where the path does not resolve
        #[arg(long, default_value = "")]
        placeholder: String,
    },

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Display version information
    Version,
}
