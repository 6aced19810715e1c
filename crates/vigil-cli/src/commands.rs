//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vigil: run declarative browser end-to-end suites with eventual assertions
#[derive(Parser, Debug)]
#[command(name = "vigil")]
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

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run test suites
    Run(RunArgs),

    /// Parse and validate suites without running them
    Validate(ValidateArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite files (YAML)
    #[arg(required = true)]
    pub suites: Vec<PathBuf>,

    /// Configuration file (default: ./vigil.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Prefix for relative visit URLs
    #[arg(long)]
    pub base_url: Option<String>,

    /// Command timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Number of concurrent sessions
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Stop after the first failing test
    #[arg(long)]
    pub fail_fast: bool,

    /// Run only tests whose full title contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Browser driver
    #[arg(long, default_value = "cdp")]
    pub driver: DriverArg,

    /// Scripted site description (required with --driver scripted)
    #[arg(long)]
    pub site: Option<PathBuf>,

    /// Show the browser window (cdp driver)
    #[arg(long)]
    pub headed: bool,

    /// Result format on stdout
    #[arg(long, default_value = "text")]
    pub format: FormatArg,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Suite files (YAML)
    #[arg(required = true)]
    pub suites: Vec<PathBuf>,

    /// Reject selectors with an unterminated quoted attribute value
    #[arg(long)]
    pub strict_selectors: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration file (default: ./vigil.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Browser driver choice
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DriverArg {
    /// Chrome DevTools Protocol (requires the `browser` feature)
    #[default]
    Cdp,
    /// In-memory scripted site
    Scripted,
}

/// Result output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON report
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color output choice
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
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

/// Log format choice
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Plain text lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "vigil",
            "-vv",
            "run",
            "home.yaml",
            "--base-url",
            "http://localhost:8080",
            "--timeout",
            "2000",
            "--driver",
            "scripted",
            "--site",
            "site.yaml",
            "-j",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.suites, vec![PathBuf::from("home.yaml")]);
        assert_eq!(args.timeout, Some(2000));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.driver, DriverArg::Scripted);
        assert_eq!(args.format, FormatArg::Text);
    }

    #[test]
    fn test_run_requires_suites() {
        assert!(Cli::try_parse_from(["vigil", "run"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["vigil", "validate", "a.yaml", "-q", "--log-format", "json"])
                .unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.log_format, LogFormatArg::Json));
    }
}
