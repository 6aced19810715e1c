//! Browser driver abstraction.
//!
//! The runner talks to a browser only through [`Driver`]: navigate, take a
//! DOM snapshot, dispatch one input event. Drivers are synchronous; an async
//! protocol client bridges internally (see the `browser` feature).
//!
//! Implementations:
//! - [`ScriptedDriver`] - deterministic in-memory site, for tests and offline runs
//! - `CdpDriver` - Chrome DevTools Protocol (requires `browser` feature)

mod scripted;

#[cfg(feature = "browser")]
mod cdp;

#[cfg(feature = "browser")]
pub use cdp::{CdpConfig, CdpDriver, CdpFactory};
pub use scripted::{
    CallLog, ClickEffect, ElementScript, PageScript, ScriptedDriver, ScriptedFactory, ScriptedSite,
};

use crate::dom::{DomSnapshot, NodeId};
use crate::result::VigilResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input event dispatched to one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Single click at the element's center
    Click {
        /// Target
        node: NodeId,
    },
    /// Double click
    DoubleClick {
        /// Target
        node: NodeId,
    },
    /// Focus and type text
    Type {
        /// Target
        node: NodeId,
        /// Text to append
        text: String,
    },
    /// Clear an input's value
    Clear {
        /// Target
        node: NodeId,
    },
}

impl InputEvent {
    /// Target element
    #[must_use]
    pub const fn target(&self) -> NodeId {
        match self {
            Self::Click { node }
            | Self::DoubleClick { node }
            | Self::Type { node, .. }
            | Self::Clear { node } => *node,
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { node } => write!(f, "click:{node}"),
            Self::DoubleClick { node } => write!(f, "dblclick:{node}"),
            Self::Type { node, text } => write!(f, "type:{node}:{text}"),
            Self::Clear { node } => write!(f, "clear:{node}"),
        }
    }
}

/// One browser session.
///
/// Every method may fail with [`crate::VigilError::Session`] when the browser
/// is gone; the runner treats that as fatal for the whole run.
pub trait Driver: Send {
    /// Start navigating to an absolute URL. Load completion is observed
    /// through [`DomSnapshot::ready_state`].
    fn navigate(&mut self, url: &str) -> VigilResult<()>;

    /// Snapshot the current document
    fn query_dom(&mut self) -> VigilResult<DomSnapshot>;

    /// Dispatch one input event
    fn dispatch_input(&mut self, event: &InputEvent) -> VigilResult<()>;

    /// Return to a blank document with no leftover page state
    fn reset(&mut self) -> VigilResult<()> {
        self.navigate("about:blank")
    }

    /// Release the session
    fn close(&mut self) -> VigilResult<()> {
        Ok(())
    }

    /// Name for logs
    fn name(&self) -> &str {
        "driver"
    }
}

/// Creates isolated sessions. Only the lifecycle manager calls this.
pub trait DriverFactory: Send + Sync {
    /// Launch a fresh session
    fn launch(&self) -> VigilResult<Box<dyn Driver>>;
}

impl<F> DriverFactory for F
where
    F: Fn() -> VigilResult<Box<dyn Driver>> + Send + Sync,
{
    fn launch(&self) -> VigilResult<Box<dyn Driver>> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_event_target_and_display() {
        let event = InputEvent::Type {
            node: 9,
            text: "hello".into(),
        };
        assert_eq!(event.target(), 9);
        assert_eq!(event.to_string(), "type:9:hello");
        assert_eq!(InputEvent::Click { node: 3 }.to_string(), "click:3");
    }

    #[test]
    fn test_closure_factory() {
        let factory = || -> VigilResult<Box<dyn Driver>> {
            Ok(Box::new(ScriptedDriver::new(ScriptedSite::default())))
        };
        let mut driver = factory.launch().unwrap_or_else(|e| panic!("{e}"));
        assert!(driver.query_dom().is_ok());
    }
}
