//! Vigil CLI Library
//!
//! Command-line interface for the Vigil test runner: argument parsing,
//! configuration layering, progress output and exit codes.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, DriverArg, FormatArg, LogFormatArg, RunArgs,
    ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_report, OutputFormat, ProgressReporter};
pub use runner::{apply_flags, load_config, run, show_config, validate};

/// Exit code when every executed test passed
pub const EXIT_PASSED: u8 = 0;
/// Exit code when a test failed or errored, or the run was aborted
pub const EXIT_FAILED: u8 = 1;
/// Exit code for usage, configuration and suite errors
pub const EXIT_USAGE: u8 = 2;
