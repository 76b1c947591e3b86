//! Command-line front end for bridge-probe.
//!
//! ```bash
//! # Run one transfer against a local app with a wallet extension
//! bridge-probe run --amount 1 --from-chain osmosis-1 --from-token uosmo \
//!     --to-chain cosmoshub-4 --to-token uatom --extension ./keplr --headed
//!
//! # Aggregate the result files of earlier runs
//! bridge-probe summary results/ --json
//!
//! # Show the effective configuration
//! bridge-probe check-config -c harness.yaml
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;

pub use commands::{Cli, ColorArg, Commands, RunArgs, SummaryArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{Reporter, RunRow, SummaryReport};
