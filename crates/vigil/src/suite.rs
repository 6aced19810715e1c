//! Suite declarations.
//!
//! Suites nest. Each suite may declare `before_each` and `after_each` hook
//! chains that wrap every test below it, at any depth. A suite's own tests
//! run before its nested suites, each list in declaration order.
//!
//! ```yaml
//! version: "1.0"
//! name: go-project
//! before_each:
//!   - type: visit
//!     url: /
//! tests:
//!   - name: has a title
//!     steps:
//!       - type: title
//!       - type: assert
//!         expect: { predicate: equals, expected: "Home | go-project" }
//! suites:
//!   - name: endpoints
//!     tests: [...]
//! ```

use crate::result::{VigilError, VigilResult};
use crate::selector::OpenValueMode;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Only supported suite file version
pub const SUITE_VERSION: &str = "1.0";

/// One test: a chain of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Name, unique among its siblings
    pub name: String,
    /// Steps, run in order
    pub steps: Vec<Step>,
    /// Default command budget for this test's steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Never run this test
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    /// Run only tests marked `only` when any is
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub only: bool,
}

impl TestCase {
    /// Create a test
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            timeout_ms: None,
            skip: false,
            only: false,
        }
    }

    /// Override the command budget
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Mark as skipped
    #[must_use]
    pub const fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Mark as exclusive
    #[must_use]
    pub const fn exclusive(mut self) -> Self {
        self.only = true;
        self
    }
}

/// A named group of tests and nested suites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// File format version, only meaningful at the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Name
    pub name: String,
    /// Setup chain run before every test below this suite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_each: Vec<Step>,
    /// Teardown chain run after every test below this suite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_each: Vec<Step>,
    /// Own tests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestCase>,
    /// Nested suites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suites: Vec<Suite>,
}

impl Suite {
    /// Start declaring a suite
    pub fn describe(name: impl Into<String>) -> Self {
        Self {
            version: None,
            name: name.into(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            tests: Vec::new(),
            suites: Vec::new(),
        }
    }

    /// Set the setup chain
    #[must_use]
    pub fn before_each(mut self, steps: Vec<Step>) -> Self {
        self.before_each = steps;
        self
    }

    /// Set the teardown chain
    #[must_use]
    pub fn after_each(mut self, steps: Vec<Step>) -> Self {
        self.after_each = steps;
        self
    }

    /// Add a test
    #[must_use]
    pub fn it(self, name: impl Into<String>, steps: Vec<Step>) -> Self {
        self.test(TestCase::new(name, steps))
    }

    /// Add a prepared test
    #[must_use]
    pub fn test(mut self, case: TestCase) -> Self {
        self.tests.push(case);
        self
    }

    /// Nest a suite.
    ///
    /// Own tests and nested suites are kept in separate lists, so a suite's
    /// own tests are planned before every nested suite even when `it` and
    /// `suite` calls are interleaved. Each list keeps its declaration order.
    #[must_use]
    pub fn suite(mut self, suite: Self) -> Self {
        self.suites.push(suite);
        self
    }

    /// Parse from YAML and validate
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or the declaration is invalid
    pub fn from_yaml(yaml: &str) -> VigilResult<Self> {
        let suite: Self = serde_yaml_ng::from_str(yaml)?;
        suite.validate(OpenValueMode::default())?;
        Ok(suite)
    }

    /// Load from a YAML file and validate
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or is invalid
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            VigilError::suite(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Number of tests at every depth
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.suites.iter().map(Self::test_count).sum::<usize>()
    }

    /// Check names, step lists, selectors and predicates before anything
    /// runs.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, naming the suite or test.
    pub fn validate(&self, open_values: OpenValueMode) -> VigilResult<()> {
        if let Some(version) = &self.version {
            if version != SUITE_VERSION {
                return Err(VigilError::suite(format!(
                    "unsupported suite version {version:?}, expected {SUITE_VERSION:?}"
                )));
            }
        }
        self.validate_at(&[], open_values)
    }

    fn validate_at(&self, path: &[&str], open_values: OpenValueMode) -> VigilResult<()> {
        if self.name.trim().is_empty() {
            return Err(VigilError::suite(format!(
                "suite under {:?} has an empty name",
                path.join(" ")
            )));
        }
        let mut here = path.to_vec();
        here.push(self.name.as_str());
        let title = here.join(" ");

        check_steps(&self.before_each, &title, "before_each", open_values)?;
        check_steps(&self.after_each, &title, "after_each", open_values)?;

        let mut names = HashSet::new();
        for case in &self.tests {
            if case.name.trim().is_empty() {
                return Err(VigilError::suite(format!("test in {title:?} has an empty name")));
            }
            if !names.insert(case.name.as_str()) {
                return Err(VigilError::suite(format!(
                    "duplicate test name {:?} in {title:?}",
                    case.name
                )));
            }
            if case.steps.is_empty() {
                return Err(VigilError::suite(format!(
                    "test {:?} in {title:?} has no steps",
                    case.name
                )));
            }
            if case.timeout_ms == Some(0) {
                return Err(VigilError::suite(format!(
                    "test {:?} in {title:?} has a zero timeout",
                    case.name
                )));
            }
            check_steps(&case.steps, &title, &case.name, open_values)?;
        }

        for suite in &self.suites {
            suite.validate_at(&here, open_values)?;
        }
        Ok(())
    }

    /// Flatten into run order with the hooks that wrap each test
    #[must_use]
    pub fn plan(&self) -> Vec<PlannedCase> {
        let mut out = Vec::new();
        self.plan_into(&mut Vec::new(), &mut Vec::new(), &mut Vec::new(), &mut out);
        out
    }

    fn plan_into(
        &self,
        path: &mut Vec<String>,
        before: &mut Vec<Vec<Step>>,
        after: &mut Vec<Vec<Step>>,
        out: &mut Vec<PlannedCase>,
    ) {
        path.push(self.name.clone());
        before.push(self.before_each.clone());
        after.push(self.after_each.clone());

        for case in &self.tests {
            let mut title_path = path.clone();
            title_path.push(case.name.clone());
            out.push(PlannedCase {
                title_path,
                case: case.clone(),
                before: before.iter().filter(|s| !s.is_empty()).cloned().collect(),
                after: after
                    .iter()
                    .rev()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect(),
            });
        }
        for suite in &self.suites {
            suite.plan_into(path, before, after, out);
        }

        let _ = path.pop();
        let _ = before.pop();
        let _ = after.pop();
    }
}

fn check_steps(
    steps: &[Step],
    title: &str,
    owner: &str,
    open_values: OpenValueMode,
) -> VigilResult<()> {
    for (index, step) in steps.iter().enumerate() {
        step.validate(open_values).map_err(|e| match e {
            VigilError::InvalidSelector { selector, message } => VigilError::InvalidSelector {
                selector,
                message: format!("{message} (in {title} / {owner}, step {index})"),
            },
            other => VigilError::suite(format!("{title} / {owner}, step {index} ({step}): {other}")),
        })?;
    }
    Ok(())
}

/// A test with everything needed to run it in isolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCase {
    /// Suite names outermost first, then the test name
    pub title_path: Vec<String>,
    /// The test
    pub case: TestCase,
    /// Setup chains, outermost suite first
    pub before: Vec<Vec<Step>>,
    /// Teardown chains, innermost suite first
    pub after: Vec<Vec<Step>>,
}

impl PlannedCase {
    /// Suite path and name joined with spaces
    #[must_use]
    pub fn full_title(&self) -> String {
        self.title_path.join(" ")
    }
}
