//! Command chain executor.
//!
//! Runs a list of [`Step`]s strictly in order against one session, threading
//! an immutable [`Subject`] from each step to the next. The first failing
//! step ends the chain; later steps never run.
//!
//! ```text
//! Subject::nothing ─▶ visit ─▶ locate ─▶ act ─▶ assert ─▶ ...
//!                       │         │        │       │
//!                       ▼         ▼        ▼       ▼
//!                  page load   retry    wait for  retry until
//!                  poll        until    actionable predicate
//!                              found    then once holds
//! ```

use crate::action::ActionDispatcher;
use crate::assertion::AssertionEngine;
use crate::config::VigilConfig;
use crate::driver::Driver;
use crate::locator::{ElementQuery, Query};
use crate::poll::{CancelToken, PollOutcome, Poller};
use crate::report::{millis, Phase, StepRecord};
use crate::result::{VigilError, VigilResult};
use crate::step::Step;
use crate::subject::Subject;
use std::time::Instant;
use tracing::{debug, info_span, warn};

/// The step that ended a chain early
#[derive(Debug)]
pub struct StepFailure {
    /// Index of the failing step
    pub index: usize,
    /// The failing step, rendered
    pub step: String,
    /// Why it failed
    pub error: VigilError,
}

/// Result of running one chain
#[derive(Debug)]
pub struct ChainOutcome {
    /// One record per step that ran
    pub records: Vec<StepRecord>,
    /// Subject yielded by the last successful step
    pub subject: Subject,
    /// First failure, if any
    pub failure: Option<StepFailure>,
}

impl ChainOutcome {
    /// Whether every step succeeded
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// Whether the chain ended on a fatal (session) error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.error.is_fatal())
    }
}

/// Runs chains against one driver
pub struct ChainExecutor<'a> {
    driver: &'a mut dyn Driver,
    config: &'a VigilConfig,
    poller: Poller,
}

impl std::fmt::Debug for ChainExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .field("poller", &self.poller)
            .finish()
    }
}

impl<'a> ChainExecutor<'a> {
    /// Create an executor. Every poll it starts observes `cancel`.
    pub fn new(driver: &'a mut dyn Driver, config: &'a VigilConfig, cancel: CancelToken) -> Self {
        Self {
            driver,
            config,
            poller: Poller::new(config.command_poll(None), cancel),
        }
    }

    /// Run `steps` in order, stopping at the first failure
    pub fn execute(&mut self, steps: &[Step]) -> ChainOutcome {
        let mut subject = Subject::nothing();
        let mut records = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let span = info_span!("step", index, step = %step);
            let _enter = span.enter();
            let started = Instant::now();

            let result = if self.poller.cancel_token().is_cancelled() {
                Err(VigilError::Cancelled {
                    what: step.to_string(),
                })
            } else {
                self.run_step(step, &subject, steps.get(index + 1))
            };

            let mut record = StepRecord {
                phase: Phase::Test,
                index,
                step: step.to_string(),
                duration_ms: millis(started.elapsed()),
                error: None,
            };
            match result {
                Ok(next) => {
                    debug!(subject = %next, "step passed");
                    records.push(record);
                    subject = next;
                }
                Err(error) => {
                    warn!(%error, "step failed");
                    record.error = Some(error.to_string());
                    records.push(record);
                    return ChainOutcome {
                        records,
                        subject,
                        failure: Some(StepFailure {
                            index,
                            step: step.to_string(),
                            error,
                        }),
                    };
                }
            }
        }

        ChainOutcome {
            records,
            subject,
            failure: None,
        }
    }

    fn run_step(&mut self, step: &Step, subject: &Subject, next: Option<&Step>) -> VigilResult<Subject> {
        match step {
            Step::Visit { url, timeout_ms } => {
                let url = self.config.resolve_url(url)?;
                let poller = self.poller.with_config(self.config.page_load_poll(*timeout_ms));
                ActionDispatcher::new(&mut *self.driver, poller).visit(&url)?;
                Ok(Subject::nothing())
            }
            Step::Locate {
                selector,
                contains,
                timeout_ms,
            } => {
                let query = self.element_query(selector, contains.as_deref())?;
                self.locate(query, *timeout_ms, next)
            }
            Step::Find {
                selector,
                contains,
                timeout_ms,
            } => {
                let Some(parent) = subject.element_query() else {
                    return Err(VigilError::InvalidSubject {
                        predicate: "find".to_string(),
                        subject: subject.label(),
                    });
                };
                let query = self
                    .element_query(selector, contains.as_deref())?
                    .within(parent.clone());
                self.locate(query, *timeout_ms, next)
            }
            Step::Title => Ok(Subject::from_query(Query::Title, &self.driver.query_dom()?)),
            Step::Url => Ok(Subject::from_query(Query::Url, &self.driver.query_dom()?)),
            Step::Act { action, timeout_ms } => {
                let poller = self.poller.with_config(self.config.command_poll(*timeout_ms));
                let outcome = ActionDispatcher::new(&mut *self.driver, poller).dispatch(action, subject)?;
                debug!(action = outcome.action, target = ?outcome.target, "acted");
                Ok(subject.clone())
            }
            Step::Assert { expect, timeout_ms } => {
                let poller = self.poller.with_config(self.config.command_poll(*timeout_ms));
                AssertionEngine::new(&mut *self.driver, poller).assert(subject, expect)
            }
        }
    }

    fn element_query(&self, selector: &str, contains: Option<&str>) -> VigilResult<ElementQuery> {
        let query = ElementQuery::parse(selector, self.config.open_attribute_values)?;
        Ok(match contains {
            Some(text) => query.with_text(text),
            None => query,
        })
    }

    // Waits for at least one match, unless the next step asserts absence.
    fn locate(
        &mut self,
        query: ElementQuery,
        timeout_ms: Option<u64>,
        next: Option<&Step>,
    ) -> VigilResult<Subject> {
        let absence_ok = matches!(next, Some(Step::Assert { expect, .. }) if expect.accepts_absence());
        let config = self.config.command_poll(timeout_ms);
        let timeout = config.timeout_ms;
        let poller = self.poller.with_config(config);
        let driver = &mut *self.driver;
        let what = format!("element {query}");

        let handles = poller
            .poll(&what, || {
                let handles = query.run(&driver.query_dom()?);
                if handles.is_empty() && !absence_ok {
                    Ok(PollOutcome::Pending("no element matched".to_string()))
                } else {
                    Ok(PollOutcome::Satisfied(handles))
                }
            })?
            .into_result(&what, timeout)?;
        Ok(Subject::elements(query, handles))
    }
}
