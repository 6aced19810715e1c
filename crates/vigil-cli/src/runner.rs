//! Command implementations

use crate::commands::{ConfigArgs, DriverArg, RunArgs, ValidateArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{render_report, OutputFormat, ProgressReporter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vigil::driver::{ScriptedFactory, ScriptedSite};
use vigil::{
    LifecycleManager, OpenValueMode, RunReport, Suite, VigilConfig, CONFIG_FILE_NAME,
};

/// Effective configuration: defaults, then the config file (explicit, or
/// `vigil.yaml` in the working directory when present), then `VIGIL_*`
/// variables from `lookup`.
///
/// # Errors
///
/// Returns error if the file cannot be read or a value does not parse
pub fn load_config<F>(explicit: Option<&Path>, lookup: F) -> CliResult<VigilConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let default_file = PathBuf::from(CONFIG_FILE_NAME);
    let file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if default_file.is_file() => Some(default_file),
        None => None,
    };
    let config = match file {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            VigilConfig::from_file(&path)?
        }
        None => VigilConfig::default(),
    };
    Ok(config.apply_env(lookup)?)
}

/// Apply `run` flags over a loaded configuration
#[must_use]
pub fn apply_flags(mut config: VigilConfig, args: &RunArgs) -> VigilConfig {
    if let Some(url) = &args.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(ms) = args.timeout {
        config.default_command_timeout_ms = ms;
    }
    if let Some(ms) = args.interval {
        config.poll_interval_ms = ms;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.fail_fast {
        config.fail_fast = true;
    }
    config
}

fn load_suites(paths: &[PathBuf]) -> CliResult<Vec<Suite>> {
    paths
        .iter()
        .map(|path| {
            Suite::from_file(path).map_err(|e| CliError::config(format!("{}: {e}", path.display())))
        })
        .collect()
}

fn manager(config: VigilConfig, args: &RunArgs) -> CliResult<LifecycleManager> {
    match args.driver {
        DriverArg::Scripted => {
            let path = args.site.as_ref().ok_or_else(|| {
                CliError::invalid_argument("--driver scripted needs --site <FILE>")
            })?;
            let site = ScriptedSite::from_file(path)?;
            let config = if config.base_url.is_none() {
                config.with_base_url(site.origin.clone())
            } else {
                config
            };
            Ok(LifecycleManager::new(ScriptedFactory::new(site), config))
        }
        DriverArg::Cdp => cdp_manager(config, args),
    }
}

#[cfg(feature = "browser")]
fn cdp_manager(config: VigilConfig, args: &RunArgs) -> CliResult<LifecycleManager> {
    use vigil::driver::{CdpConfig, CdpFactory};

    let cdp = CdpConfig::new().with_headless(!args.headed);
    Ok(LifecycleManager::new(CdpFactory::new(cdp), config))
}

#[cfg(not(feature = "browser"))]
fn cdp_manager(_config: VigilConfig, _args: &RunArgs) -> CliResult<LifecycleManager> {
    Err(CliError::invalid_argument(
        "the cdp driver is not built in; rebuild with --features browser or use --driver scripted",
    ))
}

/// Run suites and print results
///
/// # Errors
///
/// Returns error for unreadable or invalid config and suites, or when the
/// report cannot be written. Test failures are in the returned report.
pub fn run(cli: &CliConfig, args: &RunArgs) -> CliResult<RunReport> {
    let config = apply_flags(load_config(args.config.as_deref(), |k| std::env::var(k).ok())?, args);
    config.validate()?;
    let suites = load_suites(&args.suites)?;

    let mut reporter =
        ProgressReporter::new(cli.color.should_color(), cli.verbosity.is_quiet());
    reporter.start_progress("running");

    let mut manager = manager(config, args)?.with_listener(reporter.clone());
    if let Some(filter) = &args.filter {
        manager = manager.with_filter(filter.clone());
    }

    info!(suites = suites.len(), driver = ?args.driver, "starting run");
    let report = manager.run(&suites)?;
    reporter.finish();

    let format = OutputFormat::from(args.format);
    if format == OutputFormat::Text {
        reporter.summary(&report);
    }
    println!("{}", render_report(&report, format)?);

    if let Some(path) = &args.output {
        report.write_json(path)?;
        info!(path = %path.display(), "report written");
        reporter.info(&format!("report written to {}", path.display()));
    }
    Ok(report)
}

/// Validate suites and print their planned test titles
///
/// # Errors
///
/// Returns error on the first unreadable or invalid suite
pub fn validate(cli: &CliConfig, args: &ValidateArgs) -> CliResult<usize> {
    let suites = load_suites(&args.suites)?;
    let mode = if args.strict_selectors {
        OpenValueMode::Reject
    } else {
        OpenValueMode::Prefix
    };
    let mut total = 0;
    for (path, suite) in args.suites.iter().zip(&suites) {
        suite
            .validate(mode)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
        let plan = suite.plan();
        total += plan.len();
        println!("{}: {} tests", path.display(), plan.len());
        if !cli.verbosity.is_quiet() {
            for case in plan {
                println!("  {}", case.full_title());
            }
        }
    }
    Ok(total)
}

/// Print the effective configuration as YAML
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded
pub fn show_config(args: &ConfigArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref(), |k| std::env::var(k).ok())?;
    print!("{}", serde_yaml_ng::to_string(&config)?);
    Ok(())
}
