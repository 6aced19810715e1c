//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use vigil::{RunListener, RunReport, TestResult, TestStatus};

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON report
    Json,
}

/// Progress reporter for test execution.
///
/// Progress and per-test lines go to stderr; stdout is reserved for the
/// final report so it can be piped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar; its length is set when the run starts
    pub fn start_progress(&mut self, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefix(&self, symbol: &'static str, plain: &'static str, paint: fn(&str) -> String) -> String {
        if self.use_color {
            paint(symbol)
        } else {
            plain.to_string()
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("✓", "PASS", |s| style(s).green().bold().to_string());
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = self.prefix("✗", "FAIL", |s| style(s).red().bold().to_string());
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a skip message
    pub fn skipped(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("-", "SKIP", |s| style(s).yellow().to_string());
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("⚠", "WARN", |s| style(s).yellow().bold().to_string());
        self.line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = self.prefix("ℹ", "INFO", |s| style(s).blue().bold().to_string());
        self.line(&format!("{prefix} {message}"));
    }

    /// Print one test result
    pub fn result(&self, result: &TestResult) {
        let title = result.full_title();
        match &result.status {
            TestStatus::Passed => self.success(&format!("{title} ({}ms)", result.duration_ms)),
            TestStatus::Skipped { reason } => self.skipped(&format!("{title} ({reason})")),
            status => {
                let reason = status.message().unwrap_or_default();
                self.failure(&format!("{title}: {reason}"));
            }
        }
    }

    /// Print run summary
    pub fn summary(&self, report: &RunReport) {
        let failed = report.failed_count();
        if self.quiet && failed == 0 {
            return;
        }

        let passed = report.passed_count();
        let skipped = report.skipped_count();
        let total = report.total_count();
        let duration_secs = report.duration().as_secs_f64();

        self.line("");
        if let Some(reason) = &report.aborted {
            self.warning(&format!("run aborted: {reason}"));
        }
        for problem in &report.fixture_errors {
            self.warning(problem);
        }

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if report.all_passed() {
                passed_style.apply_to("PASSED")
            } else {
                failed_style.apply_to("FAILED")
            };

            self.line(&format!(
                "{} {} tests in {:.2}s ({} passed, {} failed, {} skipped)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if report.all_passed() { "PASSED" } else { "FAILED" };
            self.line(&format!(
                "{status} {total} tests in {duration_secs:.2}s ({passed} passed, {failed} failed, {skipped} skipped)"
            ));
        }
    }
}

impl RunListener for ProgressReporter {
    fn run_started(&self, total: usize) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_length(total as u64);
        }
    }

    fn case_started(&self, title: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(title.to_string());
        }
    }

    fn case_finished(&self, result: &TestResult) {
        self.result(result);
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }
}

/// Render a report for stdout
///
/// # Errors
///
/// Returns error if JSON serialization fails
pub fn render_report(report: &RunReport, format: OutputFormat) -> vigil::VigilResult<String> {
    match format {
        OutputFormat::Json => report.to_json(),
        OutputFormat::Text => {
            let mut out = String::new();
            for failure in report.failures() {
                out.push_str(&format!("{}\n", failure.full_title()));
                if let Some(message) = failure.status.message() {
                    out.push_str(&format!("    {message}\n"));
                }
            }
            out.push_str(&report.summary());
            Ok(out)
        }
    }
}
