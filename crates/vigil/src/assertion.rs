//! Assertion engine.
//!
//! An assertion is a [`Predicate`] applied to a [`Subject`]. Because pages
//! settle asynchronously, [`AssertionEngine::assert`] re-derives the subject
//! from a fresh snapshot on every attempt and keeps polling until the
//! predicate holds or the budget runs out. Only then does it fail, with the
//! last observed value as the diagnostic.
//!
//! Predicates can also be named the way chainer strings are written in
//! browser test frameworks (`"be.visible"`, `"have.length"`, ...); see
//! [`Predicate::parse`].

use crate::driver::Driver;
use crate::poll::{PollOutcome, Poller};
use crate::result::{AssertionFailure, VigilError, VigilResult};
use crate::subject::{Subject, SubjectValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Named expectation about a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "predicate", content = "expected", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Predicate {
    /// Text (or boolean) subject equals the value
    Equals(String),
    /// Text contains the value; for elements, any element's text does
    Contains(String),
    /// Text matches the regular expression; for elements, any element's text
    Matches(String),
    /// At least one element matched
    Exists,
    /// No element matched
    NotExists,
    /// At least one element matched and all are visible
    Visible,
    /// At least one element matched and none is visible
    Hidden,
    /// Combined text of the elements equals the value, ignoring outer whitespace
    HasText(String),
    /// Combined text of the elements contains the value
    ContainsText(String),
    /// Exactly this many elements matched
    HasCount(usize),
    /// Every element carries the attribute, with the value if given
    HasAttribute {
        /// Attribute name
        name: String,
        /// Required value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// At least one element matched and none is disabled
    Enabled,
    /// At least one element matched and all are disabled
    Disabled,
}

impl Predicate {
    /// Parse a predicate by canonical name or chainer alias.
    ///
    /// `has_attribute` takes its expected value as `name` or `name=value`.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Suite`] for unknown names, a missing or
    /// superfluous expected value, a non-numeric count or an invalid pattern.
    pub fn parse(name: &str, expected: Option<&str>) -> VigilResult<Self> {
        let needs = |label: &str| {
            expected.map(str::to_string).ok_or_else(|| {
                VigilError::suite(format!("predicate `{label}` needs an expected value"))
            })
        };
        let predicate = match name.trim() {
            "equals" | "eq" | "equal" => Self::Equals(needs("equals")?),
            "contains" | "contain" | "include" => Self::Contains(needs("contains")?),
            "matches" | "match" => Self::Matches(needs("matches")?),
            "exists" | "exist" => Self::Exists,
            "not_exists" | "not.exist" => Self::NotExists,
            "visible" | "be.visible" => Self::Visible,
            "hidden" | "not.be.visible" | "be.hidden" => Self::Hidden,
            "has_text" | "have.text" => Self::HasText(needs("has_text")?),
            "contains_text" | "contain.text" => Self::ContainsText(needs("contains_text")?),
            "has_count" | "have.length" => {
                let raw = needs("has_count")?;
                let count = raw.trim().parse().map_err(|_| {
                    VigilError::suite(format!("predicate `has_count` needs a count, got {raw:?}"))
                })?;
                Self::HasCount(count)
            }
            "has_attribute" | "have.attr" => {
                let raw = needs("has_attribute")?;
                match raw.split_once('=') {
                    Some((attr, value)) => Self::HasAttribute {
                        name: attr.trim().to_string(),
                        value: Some(value.to_string()),
                    },
                    None => Self::HasAttribute {
                        name: raw.trim().to_string(),
                        value: None,
                    },
                }
            }
            "enabled" | "be.enabled" => Self::Enabled,
            "disabled" | "be.disabled" => Self::Disabled,
            other => return Err(VigilError::suite(format!("unknown predicate `{other}`"))),
        };
        if predicate.expected().is_none() && expected.is_some() {
            return Err(VigilError::suite(format!(
                "predicate `{}` takes no expected value",
                predicate.name()
            )));
        }
        predicate.validate()?;
        Ok(predicate)
    }

    /// Canonical name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::Contains(_) => "contains",
            Self::Matches(_) => "matches",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::HasText(_) => "has_text",
            Self::ContainsText(_) => "contains_text",
            Self::HasCount(_) => "has_count",
            Self::HasAttribute { .. } => "has_attribute",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    /// Expected value, rendered for diagnostics
    #[must_use]
    pub fn expected(&self) -> Option<String> {
        match self {
            Self::Equals(v)
            | Self::Contains(v)
            | Self::Matches(v)
            | Self::HasText(v)
            | Self::ContainsText(v) => Some(v.clone()),
            Self::HasCount(n) => Some(n.to_string()),
            Self::HasAttribute { name, value } => Some(match value {
                Some(value) => format!("{name}={value}"),
                None => name.clone(),
            }),
            Self::Exists
            | Self::NotExists
            | Self::Visible
            | Self::Hidden
            | Self::Enabled
            | Self::Disabled => None,
        }
    }

    /// Whether the predicate can hold when nothing matched
    #[must_use]
    pub const fn accepts_absence(&self) -> bool {
        matches!(self, Self::NotExists | Self::HasCount(0))
    }

    /// Check the predicate's own arguments.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Suite`] for an invalid pattern or an empty
    /// attribute name.
    pub fn validate(&self) -> VigilResult<()> {
        match self {
            Self::Matches(pattern) => compile(pattern).map(drop),
            Self::HasAttribute { name, .. } if name.trim().is_empty() => {
                Err(VigilError::suite("predicate `has_attribute` needs an attribute name"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        if let Some(expected) = self.expected() {
            write!(f, " {expected:?}")?;
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> VigilResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| VigilError::suite(format!("invalid pattern {pattern:?}: {e}")))
}

/// Result of one predicate evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Predicate holds
    Pass,
    /// Predicate does not hold; `actual` describes what was observed
    Fail {
        /// Observed value
        actual: String,
    },
}

impl Evaluation {
    fn check(ok: bool, actual: impl FnOnce() -> String) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail { actual: actual() }
        }
    }

    /// Whether the predicate held
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Evaluate a predicate once against a subject.
///
/// # Errors
///
/// Returns [`VigilError::InvalidSubject`] when the predicate does not apply
/// to this kind of subject. That error is never retried.
pub fn evaluate(predicate: &Predicate, subject: &Subject) -> VigilResult<Evaluation> {
    match subject.value() {
        SubjectValue::Text(text) => evaluate_text(predicate, text, subject),
        SubjectValue::Bool(value) => match predicate {
            Predicate::Equals(expected) => {
                Ok(Evaluation::check(value.to_string() == *expected, || {
                    value.to_string()
                }))
            }
            _ => Err(invalid(predicate, subject)),
        },
        SubjectValue::Elements(_) => evaluate_elements(predicate, subject),
        SubjectValue::Nothing => Err(invalid(predicate, subject)),
    }
}

fn invalid(predicate: &Predicate, subject: &Subject) -> VigilError {
    VigilError::InvalidSubject {
        predicate: predicate.name().to_string(),
        subject: subject.label(),
    }
}

fn evaluate_text(predicate: &Predicate, text: &str, subject: &Subject) -> VigilResult<Evaluation> {
    let actual = || format!("{text:?}");
    Ok(match predicate {
        Predicate::Equals(expected) => Evaluation::check(text == expected, actual),
        Predicate::Contains(needle) | Predicate::ContainsText(needle) => {
            Evaluation::check(text.contains(needle.as_str()), actual)
        }
        Predicate::HasText(expected) => Evaluation::check(text.trim() == expected.trim(), actual),
        Predicate::Matches(pattern) => Evaluation::check(compile(pattern)?.is_match(text), actual),
        _ => return Err(invalid(predicate, subject)),
    })
}

fn evaluate_elements(predicate: &Predicate, subject: &Subject) -> VigilResult<Evaluation> {
    let handles = subject.handles();
    let observed = || subject.value().to_string();
    let joined = || {
        handles
            .iter()
            .map(|h| h.text_content.as_str())
            .collect::<String>()
    };

    Ok(match predicate {
        Predicate::Exists => Evaluation::check(!handles.is_empty(), observed),
        Predicate::NotExists => Evaluation::check(handles.is_empty(), observed),
        Predicate::HasCount(n) => Evaluation::check(handles.len() == *n, observed),
        Predicate::Visible => match handles.iter().find(|h| !h.is_visible()) {
            _ if handles.is_empty() => Evaluation::Fail { actual: observed() },
            Some(hidden) => Evaluation::Fail {
                actual: format!("{hidden} is not visible"),
            },
            None => Evaluation::Pass,
        },
        Predicate::Hidden => match handles.iter().find(|h| h.is_visible()) {
            _ if handles.is_empty() => Evaluation::Fail { actual: observed() },
            Some(shown) => Evaluation::Fail {
                actual: format!("{shown} is visible"),
            },
            None => Evaluation::Pass,
        },
        Predicate::Enabled => match handles.iter().find(|h| h.state.disabled) {
            _ if handles.is_empty() => Evaluation::Fail { actual: observed() },
            Some(disabled) => Evaluation::Fail {
                actual: format!("{disabled} is disabled"),
            },
            None => Evaluation::Pass,
        },
        Predicate::Disabled => match handles.iter().find(|h| !h.state.disabled) {
            _ if handles.is_empty() => Evaluation::Fail { actual: observed() },
            Some(enabled) => Evaluation::Fail {
                actual: format!("{enabled} is enabled"),
            },
            None => Evaluation::Pass,
        },
        Predicate::HasText(expected) => {
            let text = joined();
            Evaluation::check(
                !handles.is_empty() && text.trim() == expected.trim(),
                || format!("{text:?}"),
            )
        }
        Predicate::ContainsText(needle) | Predicate::Contains(needle) => {
            let text = joined();
            Evaluation::check(
                handles
                    .iter()
                    .any(|h| h.text_content.contains(needle.as_str())),
                || format!("{text:?}"),
            )
        }
        Predicate::Matches(pattern) => {
            let re = compile(pattern)?;
            Evaluation::check(
                handles.iter().any(|h| re.is_match(&h.text_content)),
                || format!("{:?}", joined()),
            )
        }
        Predicate::HasAttribute { name, value } => {
            let failing = handles.iter().find(|h| match (h.attr(name), value) {
                (None, _) => true,
                (Some(actual), Some(expected)) => actual != expected,
                (Some(_), None) => false,
            });
            match failing {
                _ if handles.is_empty() => Evaluation::Fail { actual: observed() },
                Some(handle) => Evaluation::Fail {
                    actual: match handle.attr(name) {
                        Some(actual) => format!("{handle} with {name}={actual:?}"),
                        None => format!("{handle} without {name}"),
                    },
                },
                None => Evaluation::Pass,
            }
        }
        Predicate::Equals(_) => return Err(invalid(predicate, subject)),
    })
}

/// Polls a predicate against a live subject
pub struct AssertionEngine<'a> {
    driver: &'a mut dyn Driver,
    poller: Poller,
}

impl std::fmt::Debug for AssertionEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionEngine")
            .field("driver", &self.driver.name())
            .field("poller", &self.poller)
            .finish()
    }
}

impl<'a> AssertionEngine<'a> {
    /// Create an engine over a driver. The poller's config is the budget.
    pub fn new(driver: &'a mut dyn Driver, poller: Poller) -> Self {
        Self { driver, poller }
    }

    /// Wait until `predicate` holds for `subject`, returning the subject as
    /// last observed.
    ///
    /// # Errors
    ///
    /// - [`VigilError::AssertionFailed`] if the budget ran out, carrying the
    ///   subject, predicate, expected and last actual value
    /// - [`VigilError::InvalidSubject`] immediately for a mismatched subject
    /// - [`VigilError::Session`] or [`VigilError::Cancelled`] as they occur
    pub fn assert(&mut self, subject: &Subject, predicate: &Predicate) -> VigilResult<Subject> {
        let driver = &mut *self.driver;
        let what = format!("{} {predicate}", subject.label());
        let mut last = subject.clone();

        let polled = self.poller.poll(&what, || {
            let current = if subject.is_live() {
                subject.refresh(&driver.query_dom()?)
            } else {
                subject.clone()
            };
            last = current.clone();
            match evaluate(predicate, &current)? {
                Evaluation::Pass => Ok(PollOutcome::Satisfied(current)),
                Evaluation::Fail { actual } => Ok(PollOutcome::Pending(actual)),
            }
        })?;

        match polled.outcome {
            PollOutcome::Satisfied(current) => {
                debug!(assertion = %what, attempts = polled.attempts, "assertion passed");
                Ok(current)
            }
            PollOutcome::Pending(actual) | PollOutcome::TimedOut(actual) => {
                Err(VigilError::AssertionFailed(Box::new(AssertionFailure {
                    query: subject.label(),
                    subject: last.to_string(),
                    predicate: predicate.name().to_string(),
                    expected: predicate.expected(),
                    actual,
                    timeout_ms: self.poller.config().timeout_ms,
                })))
            }
        }
    }
}
