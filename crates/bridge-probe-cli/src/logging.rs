//! Tracing subscriber setup

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the verbosity default.
///
/// Logs go to stderr so stdout stays clean for YAML and JSON output.
pub fn init(config: &CliConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.with_ansi(config.color.should_color()).try_init()
    };
    installed.map_err(|e| CliError::config(format!("cannot install logger: {e}")))
}
