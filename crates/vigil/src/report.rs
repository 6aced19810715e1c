//! Test results and run reports.
//!
//! A [`RunReport`] lists one [`TestResult`] per declared test case, in
//! declaration order, whatever order the cases actually ran in.

use crate::result::{AssertionFailure, ErrorKind, VigilError, VigilResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Which part of a test case a step belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// `before_each` hooks
    Setup,
    /// The test's own steps
    #[default]
    Test,
    /// `after_each` hooks
    Teardown,
}

/// Timing and outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Phase the step ran in
    pub phase: Phase,
    /// Index within its chain
    pub index: usize,
    /// Human readable step
    pub step: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Error message, if the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    /// Whether the step succeeded
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.error.is_none()
    }

    /// Same record, tagged with a phase
    #[must_use]
    pub const fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }
}

/// Final status of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestStatus {
    /// Every step held
    Passed,
    /// A step failed; later steps of that chain did not run
    Failed {
        /// Phase of the failing step
        phase: Phase,
        /// Index of the failing step within its chain
        step_index: usize,
        /// The failing step
        step: String,
        /// Error classification
        kind: ErrorKind,
        /// Error message
        reason: String,
        /// Assertion diagnostics, for assertion failures
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assertion: Option<AssertionFailure>,
    },
    /// The session broke; the run was aborted
    Errored {
        /// Error message
        cause: String,
    },
    /// Not run
    Skipped {
        /// Why
        reason: String,
    },
}

impl TestStatus {
    /// Build a failed status from a step error
    #[must_use]
    pub fn failed(phase: Phase, step_index: usize, step: impl Into<String>, error: &VigilError) -> Self {
        Self::Failed {
            phase,
            step_index,
            step: step.into(),
            kind: error.kind(),
            reason: error.to_string(),
            assertion: error.assertion().cloned(),
        }
    }

    /// Check if status is passing
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Check if status is failing (failed or errored)
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Errored { .. })
    }

    /// Check if the case was skipped
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Short label
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed { .. } => "failed",
            Self::Errored { .. } => "errored",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// Failure or skip message, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed { reason, .. } => Some(reason),
            Self::Errored { cause } => Some(cause),
            Self::Skipped { reason } => Some(reason),
        }
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Enclosing suite names, outermost first, then the test name
    pub title_path: Vec<String>,
    /// Status
    #[serde(flatten)]
    pub status: TestStatus,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Completion time
    pub finished_at: DateTime<Utc>,
    /// Executed steps, hooks included
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRecord>,
}

impl TestResult {
    /// Create a result
    #[must_use]
    pub fn new(title_path: Vec<String>, status: TestStatus, duration: Duration) -> Self {
        Self {
            name: title_path.last().cloned().unwrap_or_default(),
            title_path,
            status,
            duration_ms: millis(duration),
            finished_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    /// Create a skipped result
    #[must_use]
    pub fn skipped(title_path: Vec<String>, reason: impl Into<String>) -> Self {
        Self::new(
            title_path,
            TestStatus::Skipped {
                reason: reason.into(),
            },
            Duration::ZERO,
        )
    }

    /// Attach step records
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<StepRecord>) -> Self {
        self.steps = steps;
        self
    }

    /// Suite path and name joined, e.g. `"go-project home has a title"`
    #[must_use]
    pub fn full_title(&self) -> String {
        self.title_path.join(" ")
    }

    /// Duration
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Results of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run id
    pub run_id: Uuid,
    /// Run name (the suite name, or a combined name for several suites)
    pub name: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// One result per declared test case, in declaration order
    pub results: Vec<TestResult>,
    /// Why the run stopped early, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Run-level fixture teardown problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixture_errors: Vec<String>,
}

impl RunReport {
    /// Create an empty report starting now
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            name: name.into(),
            started_at: Utc::now(),
            duration_ms: 0,
            results: Vec::new(),
            aborted: None,
            fixture_errors: Vec::new(),
        }
    }

    /// Get number of passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_passed()).count()
    }

    /// Get number of failed or errored tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_failed()).count()
    }

    /// Get number of skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_skipped()).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// Get pass rate over executed tests (0.0 to 1.0)
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        let executed = self.passed_count() + self.failed_count();
        if executed == 0 {
            return 1.0;
        }
        self.passed_count() as f64 / executed as f64
    }

    /// Check if the run succeeded: nothing failed and nothing aborted
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed_count() == 0 && self.aborted.is_none()
    }

    /// Get failing tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| r.status.is_failed())
            .collect()
    }

    /// Get total duration
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Generate summary string
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}: {}/{} passed ({:.1}%)",
            self.name,
            self.passed_count(),
            self.total_count(),
            self.pass_rate() * 100.0
        );
        if self.skipped_count() > 0 {
            summary.push_str(&format!(", {} skipped", self.skipped_count()));
        }
        if self.aborted.is_some() {
            summary.push_str(", aborted");
        }
        summary
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> VigilResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write JSON to a file
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn write_json(&self, path: &Path) -> VigilResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Parse a report written by [`Self::write_json`]
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> VigilResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
