//! Vigil CLI: run declarative browser end-to-end suites
//!
//! ## Usage
//!
//! ```bash
//! vigil run tests/home.yaml --base-url http://localhost:8080
//! vigil run tests/*.yaml --driver scripted --site site.yaml -j 4
//! vigil validate tests/home.yaml
//! vigil config
//! ```

use clap::Parser;
use std::process::ExitCode;
use vigil_cli::{
    Cli, CliConfig, CliResult, ColorChoice, Commands, LogFormat, Verbosity, EXIT_FAILED,
    EXIT_PASSED, EXIT_USAGE,
};

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn run() -> CliResult<u8> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.init_tracing();

    match cli.command {
        Commands::Run(args) => {
            let report = vigil_cli::run(&config, &args)?;
            Ok(if report.all_passed() {
                EXIT_PASSED
            } else {
                EXIT_FAILED
            })
        }
        Commands::Validate(args) => {
            let _ = vigil_cli::validate(&config, &args)?;
            Ok(EXIT_PASSED)
        }
        Commands::Config(args) => {
            vigil_cli::show_config(&args)?;
            Ok(EXIT_PASSED)
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    let log_format: LogFormat = cli.log_format.into();

    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_format(log_format)
}
