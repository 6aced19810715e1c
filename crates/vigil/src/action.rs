//! Action dispatcher.
//!
//! Before an input event is sent, the target must be actionable: exactly one
//! element matches, and it is attached, visible, enabled and not covered.
//! The dispatcher polls those preconditions against fresh snapshots, then
//! dispatches the event exactly once. Events are never replayed after a
//! dispatch, even if the page reacts badly.

use crate::dom::{ElementHandle, NodeId};
use crate::driver::{Driver, InputEvent};
use crate::poll::{PollOutcome, Poller};
use crate::result::{VigilError, VigilResult};
use crate::step::Action;
use crate::subject::Subject;
use std::time::Duration;
use tracing::{debug, info};

/// What an action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Action name (`visit`, `click`, ...)
    pub action: &'static str,
    /// Element the event went to, for element actions
    pub target: Option<NodeId>,
    /// Precondition checks made before dispatch
    pub attempts: u32,
    /// Time spent waiting for preconditions
    pub waited: Duration,
}

/// Waits for actionability and dispatches input through a driver
pub struct ActionDispatcher<'a> {
    driver: &'a mut dyn Driver,
    poller: Poller,
}

impl std::fmt::Debug for ActionDispatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("driver", &self.driver.name())
            .field("poller", &self.poller)
            .finish()
    }
}

impl<'a> ActionDispatcher<'a> {
    /// Create a dispatcher. The poller's config is the wait budget.
    pub fn new(driver: &'a mut dyn Driver, poller: Poller) -> Self {
        Self { driver, poller }
    }

    /// Navigate to an absolute URL and wait for the document to finish
    /// loading.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::TimedOut`] if the page never completes loading,
    /// or the driver's error if navigation itself fails.
    pub fn visit(&mut self, url: &str) -> VigilResult<ActionOutcome> {
        info!(url, "visit");
        self.driver.navigate(url)?;

        let driver = &mut *self.driver;
        let what = format!("page load of {url}");
        let polled = self.poller.poll(&what, || {
            let snapshot = driver.query_dom()?;
            if snapshot.is_loaded() {
                Ok(PollOutcome::Satisfied(()))
            } else {
                Ok(PollOutcome::Pending(format!(
                    "{} is {:?}",
                    snapshot.url, snapshot.ready_state
                )))
            }
        })?;
        let attempts = polled.attempts;
        let waited = polled.elapsed;
        polled.into_result(&what, self.poller.config().timeout_ms)?;

        Ok(ActionOutcome {
            action: "visit",
            target: None,
            attempts,
            waited,
        })
    }

    /// Wait until the subject resolves to one actionable element, then
    /// dispatch `action` to it once.
    ///
    /// # Errors
    ///
    /// - [`VigilError::InvalidSubject`] if the subject is not an element query
    /// - [`VigilError::ElementNotActionable`] if the budget runs out with zero,
    ///   several, or only non-actionable matches
    /// - the driver's error if dispatch fails
    pub fn dispatch(&mut self, action: &Action, target: &Subject) -> VigilResult<ActionOutcome> {
        let Some(query) = target.element_query() else {
            return Err(VigilError::InvalidSubject {
                predicate: action.name().to_string(),
                subject: target.label(),
            });
        };

        let driver = &mut *self.driver;
        let what = format!("{} on {query}", action.name());
        let polled = self.poller.poll(&what, || {
            let snapshot = driver.query_dom()?;
            let handles = query.run(&snapshot);
            Ok(match handles.as_slice() {
                [] => PollOutcome::Pending("no element matched".to_string()),
                [one] => match one.state.check_actionable() {
                    Ok(()) => PollOutcome::Satisfied(one.clone()),
                    Err(reason) => PollOutcome::Pending(format!("{one}: {reason}")),
                },
                many => PollOutcome::Pending(format!(
                    "{} elements matched, expected exactly one",
                    many.len()
                )),
            })
        })?;

        let handle: ElementHandle = match polled.outcome {
            PollOutcome::Satisfied(handle) => handle,
            PollOutcome::Pending(last) | PollOutcome::TimedOut(last) => {
                return Err(VigilError::ElementNotActionable {
                    selector: query.to_string(),
                    timeout_ms: self.poller.config().timeout_ms,
                    last_observed: last,
                });
            }
        };

        let event = input_event(action, handle.id);
        debug!(event = %event, attempts = polled.attempts, "dispatch");
        self.driver.dispatch_input(&event)?;

        Ok(ActionOutcome {
            action: action.name(),
            target: Some(handle.id),
            attempts: polled.attempts,
            waited: polled.elapsed,
        })
    }
}

fn input_event(action: &Action, node: NodeId) -> InputEvent {
    match action {
        Action::Click => InputEvent::Click { node },
        Action::DoubleClick => InputEvent::DoubleClick { node },
        Action::Type { text } => InputEvent::Type {
            node,
            text: text.clone(),
        },
        Action::Clear => InputEvent::Clear { node },
    }
}
