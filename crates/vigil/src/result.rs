//! Result and error types for Vigil.
//!
//! Step-level errors (everything except [`VigilError::Session`]) end the
//! current chain and are recorded on the test result. Session errors are
//! fatal: the lifecycle manager aborts the remaining run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for Vigil operations
pub type VigilResult<T> = Result<T, VigilError>;

/// Errors that can occur while resolving, polling, acting or asserting
#[derive(Debug, Error)]
pub enum VigilError {
    /// Malformed locator, detected at parse time and never retried
    #[error("Invalid selector `{selector}`: {message}")]
    InvalidSelector {
        /// Selector source text
        selector: String,
        /// Parse error message
        message: String,
    },

    /// A poll exhausted its time budget
    #[error("Timed out after {timeout_ms}ms waiting for {what} ({attempts} attempts): {last_observed}")]
    TimedOut {
        /// What was being waited for
        what: String,
        /// Budget in milliseconds
        timeout_ms: u64,
        /// Number of predicate evaluations
        attempts: u32,
        /// Last observed state
        last_observed: String,
    },

    /// Actionability never held within the budget
    #[error("Element `{selector}` was not actionable after {timeout_ms}ms: {last_observed}")]
    ElementNotActionable {
        /// Target description
        selector: String,
        /// Budget in milliseconds
        timeout_ms: u64,
        /// Last observed state
        last_observed: String,
    },

    /// Expectation still unmet when the poll budget ran out
    #[error("{0}")]
    AssertionFailed(Box<AssertionFailure>),

    /// Predicate applied to a subject of the wrong kind
    #[error("Predicate `{predicate}` cannot be applied to {subject}")]
    InvalidSubject {
        /// Predicate name
        predicate: String,
        /// Subject description
        subject: String,
    },

    /// The browser could not load a URL (DNS, refused connection, bad scheme)
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL
        url: String,
        /// Browser-reported reason
        message: String,
    },

    /// Driver or browser level failure (fatal for the run)
    #[error("Session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Work was cancelled before it finished
    #[error("Cancelled while waiting for {what}")]
    Cancelled {
        /// What was being waited for
        what: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid suite declaration
    #[error("Suite error: {message}")]
    Suite {
        /// Error message
        message: String,
    },

    /// Run-level fixture setup or teardown failed
    #[error("Fixture error: {message}")]
    Fixture {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl VigilError {
    /// Create a session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a suite declaration error
    pub fn suite(message: impl Into<String>) -> Self {
        Self::Suite {
            message: message.into(),
        }
    }

    /// Create a fixture error
    pub fn fixture(message: impl Into<String>) -> Self {
        Self::Fixture {
            message: message.into(),
        }
    }

    /// Create an invalid selector error
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Fatal errors abort the whole run, not just the current chain
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Session { .. })
    }

    /// Errors that a poll must surface immediately instead of retrying
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidSelector { .. }
                | Self::InvalidSubject { .. }
                | Self::Session { .. }
                | Self::Cancelled { .. }
                | Self::Config { .. }
                | Self::Suite { .. }
                | Self::Fixture { .. }
                | Self::Navigation { .. }
        )
    }

    /// Short machine-friendly kind name, used in reports
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSelector { .. } => ErrorKind::InvalidSelector,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::ElementNotActionable { .. } => ErrorKind::ElementNotActionable,
            Self::AssertionFailed(_) => ErrorKind::AssertionFailure,
            Self::InvalidSubject { .. } => ErrorKind::InvalidSubject,
            Self::Navigation { .. } => ErrorKind::Navigation,
            Self::Session { .. } => ErrorKind::Session,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config { .. } | Self::Suite { .. } => ErrorKind::Declaration,
            Self::Fixture { .. } => ErrorKind::Fixture,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => ErrorKind::Io,
        }
    }

    /// The failed assertion, if this is an assertion failure
    #[must_use]
    pub fn assertion(&self) -> Option<&AssertionFailure> {
        match self {
            Self::AssertionFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Coarse error classification carried in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed selector
    InvalidSelector,
    /// Poll budget exhausted
    TimedOut,
    /// Action precondition never held
    ElementNotActionable,
    /// Expected vs actual mismatch
    AssertionFailure,
    /// Wrong subject kind for a predicate
    InvalidSubject,
    /// Page could not be loaded
    Navigation,
    /// Driver failure
    Session,
    /// Cancelled by an abort
    Cancelled,
    /// Bad configuration or suite declaration
    Declaration,
    /// Run-level fixture failure
    Fixture,
    /// IO or serialization failure
    Io,
}

/// Diagnostic context for an assertion that stayed false past its timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// What was asserted on, e.g. a selector or `title`
    pub query: String,
    /// The subject as last observed: query and what it matched
    pub subject: String,
    /// Canonical predicate name
    pub predicate: String,
    /// Expected value, if the predicate takes one
    pub expected: Option<String>,
    /// Actual value observed on the last attempt
    pub actual: String,
    /// Budget in milliseconds
    pub timeout_ms: u64,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {} {}", self.query, self.predicate)?;
        if let Some(expected) = &self.expected {
            write!(f, " {expected:?}")?;
        }
        write!(
            f,
            ", but was {} (after {}ms)",
            self.actual, self.timeout_ms
        )
    }
}
