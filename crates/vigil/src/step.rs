//! Declarative chain steps.
//!
//! A test is a list of steps run in order against one session. Steps are
//! plain data so suites can be written in YAML:
//!
//! ```yaml
//! - type: visit
//!   url: /
//! - type: locate
//!   selector: "button[data-test=create-endpoint]"
//! - type: act
//!   action: { kind: click }
//! - type: url
//! - type: assert
//!   expect: { predicate: contains, expected: /endpoints }
//! ```

use crate::assertion::Predicate;
use crate::result::VigilResult;
use crate::selector::{OpenValueMode, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input an `act` step performs on its subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Click
    Click,
    /// Double click
    DoubleClick,
    /// Type text into the element
    Type {
        /// Text to type
        text: String,
    },
    /// Clear the element's value
    Clear,
}

impl Action {
    /// Short name for logs and errors
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DoubleClick => "double_click",
            Self::Type { .. } => "type",
            Self::Clear => "clear",
        }
    }
}

/// One command in a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Navigate and wait for the page to load. Yields nothing.
    Visit {
        /// Absolute URL, or a path joined to the configured base URL
        url: String,
        /// Page load budget override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Find elements in the whole document
    Locate {
        /// Selector
        selector: String,
        /// Keep only elements whose text contains this
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
        /// Budget override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Find elements inside the current element subject
    Find {
        /// Selector
        selector: String,
        /// Keep only elements whose text contains this
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
        /// Budget override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Yield the document title
    Title,
    /// Yield the document URL
    Url,
    /// Perform an action on the element subject. Yields the same subject.
    Act {
        /// Action
        action: Action,
        /// Actionability budget override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Wait for a predicate to hold. Yields the refreshed subject.
    Assert {
        /// Expectation
        expect: Predicate,
        /// Budget override
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl Step {
    /// Visit a URL
    pub fn visit(url: impl Into<String>) -> Self {
        Self::Visit {
            url: url.into(),
            timeout_ms: None,
        }
    }

    /// Locate elements in the document
    pub fn locate(selector: impl Into<String>) -> Self {
        Self::Locate {
            selector: selector.into(),
            contains: None,
            timeout_ms: None,
        }
    }

    /// Locate elements containing text
    pub fn locate_containing(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Locate {
            selector: selector.into(),
            contains: Some(text.into()),
            timeout_ms: None,
        }
    }

    /// Find elements inside the subject
    pub fn find(selector: impl Into<String>) -> Self {
        Self::Find {
            selector: selector.into(),
            contains: None,
            timeout_ms: None,
        }
    }

    /// Yield the title
    #[must_use]
    pub const fn title() -> Self {
        Self::Title
    }

    /// Yield the URL
    #[must_use]
    pub const fn url() -> Self {
        Self::Url
    }

    /// Click the subject
    #[must_use]
    pub const fn click() -> Self {
        Self::act(Action::Click)
    }

    /// Type into the subject
    pub fn type_text(text: impl Into<String>) -> Self {
        Self::act(Action::Type { text: text.into() })
    }

    /// Perform an action
    #[must_use]
    pub const fn act(action: Action) -> Self {
        Self::Act {
            action,
            timeout_ms: None,
        }
    }

    /// Assert a predicate
    #[must_use]
    pub const fn assert(expect: Predicate) -> Self {
        Self::Assert {
            expect,
            timeout_ms: None,
        }
    }

    /// Assert using a chainer name, e.g. `should("be.visible", None)`.
    ///
    /// # Errors
    ///
    /// See [`Predicate::parse`].
    pub fn should(chainer: &str, expected: Option<&str>) -> VigilResult<Self> {
        Ok(Self::assert(Predicate::parse(chainer, expected)?))
    }

    /// Override this step's budget. No effect on `title` and `url`.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        match &mut self {
            Self::Visit { timeout_ms, .. }
            | Self::Locate { timeout_ms, .. }
            | Self::Find { timeout_ms, .. }
            | Self::Act { timeout_ms, .. }
            | Self::Assert { timeout_ms, .. } => *timeout_ms = Some(ms),
            Self::Title | Self::Url => {}
        }
        self
    }

    /// Budget override, if any
    #[must_use]
    pub const fn timeout_ms(&self) -> Option<u64> {
        match self {
            Self::Visit { timeout_ms, .. }
            | Self::Locate { timeout_ms, .. }
            | Self::Find { timeout_ms, .. }
            | Self::Act { timeout_ms, .. }
            | Self::Assert { timeout_ms, .. } => *timeout_ms,
            Self::Title | Self::Url => None,
        }
    }

    /// Check selectors and predicate arguments without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VigilError::InvalidSelector`] or
    /// [`crate::VigilError::Suite`] for the first problem found.
    pub fn validate(&self, open_values: OpenValueMode) -> VigilResult<()> {
        match self {
            Self::Locate { selector, .. } | Self::Find { selector, .. } => {
                Selector::parse_with(selector, open_values).map(drop)
            }
            Self::Assert { expect, .. } => expect.validate(),
            Self::Visit { .. } | Self::Title | Self::Url | Self::Act { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visit { url, .. } => write!(f, "visit {url}"),
            Self::Locate {
                selector, contains, ..
            }
            | Self::Find {
                selector, contains, ..
            } => {
                let verb = if matches!(self, Self::Find { .. }) {
                    "find"
                } else {
                    "locate"
                };
                write!(f, "{verb} `{selector}`")?;
                if let Some(text) = contains {
                    write!(f, " containing {text:?}")?;
                }
                Ok(())
            }
            Self::Title => f.write_str("title"),
            Self::Url => f.write_str("url"),
            Self::Act { action, .. } => match action {
                Action::Type { text } => write!(f, "type {text:?}"),
                other => f.write_str(other.name()),
            },
            Self::Assert { expect, .. } => write!(f, "assert {expect}"),
        }
    }
}
