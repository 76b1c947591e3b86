//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bridge-probe: end-to-end checks for wallet-driven bridge transfers
#[derive(Parser, Debug)]
#[command(name = "bridge-probe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Harness configuration file (YAML)
    #[arg(short, long, global = true, env = "BRIDGE_PROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one bridge operation in Chromium and write its result
    Run(RunArgs),

    /// Summarize result files in a directory
    Summary(SummaryArgs),

    /// Load, validate and print the harness configuration
    CheckConfig,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Amount to transfer
    #[arg(long)]
    pub amount: String,

    /// Source chain
    #[arg(long)]
    pub from_chain: String,

    /// Source token
    #[arg(long)]
    pub from_token: String,

    /// Destination chain
    #[arg(long)]
    pub to_chain: String,

    /// Destination token
    #[arg(long)]
    pub to_token: String,

    /// Route preference
    #[arg(long, default_value = "fastest")]
    pub route_type: String,

    /// Recipient address on the destination chain
    #[arg(long)]
    pub target_address: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium executable
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium: Option<PathBuf>,

    /// Browser profile directory holding the wallet state
    #[arg(long)]
    pub user_data_dir: Option<PathBuf>,

    /// Unpacked wallet extension to load (repeatable)
    #[arg(long = "extension")]
    pub extensions: Vec<PathBuf>,

    /// YAML map of capability name to CSS selector
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Also write the captured traffic as HAR
    #[arg(long)]
    pub har: bool,
}

/// Arguments for the summary command
#[derive(Parser, Debug)]
pub struct SummaryArgs {
    /// Directory containing result JSON files
    pub results_dir: PathBuf,

    /// Print the aggregate as JSON
    #[arg(long)]
    pub json: bool,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
