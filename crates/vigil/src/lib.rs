//! Vigil: declarative browser-driven end-to-end test runner
//!
//! Tests are chains of steps (`visit`, `get`, `click`, `should`) run against
//! a live page. Every query and assertion retries until it holds or its time
//! budget runs out, so tests read synchronously while the page settles
//! asynchronously underneath.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     VIGIL Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Suite      │    │ Lifecycle  │    │ Chain      │            │
//! │   │ (YAML/Rust)│───►│ Manager    │───►│ Executor   │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │ one session     │ per step          │
//! │                           ▼ per case        ▼                   │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Driver     │◄───│ Action     │    │ Assertion  │            │
//! │   │ (CDP or    │    │ Dispatcher │    │ Engine     │            │
//! │   │  scripted) │◄───┴─────┬──────┘    └─────┬──────┘            │
//! │   └────────────┘          └──── Poller ─────┘                   │
//! │                           Selector Resolver                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use vigil::driver::{ElementScript, PageScript, ScriptedFactory, ScriptedSite};
//! use vigil::{LifecycleManager, Step, Suite, VigilConfig};
//!
//! let site = ScriptedSite::new().page(
//!     "/",
//!     PageScript::new("Home").element(ElementScript::new("h1").text("Welcome")),
//! );
//! let suite = Suite::describe("home").it(
//!     "greets",
//!     vec![
//!         Step::visit("/"),
//!         Step::title(),
//!         Step::should("eq", Some("Home"))?,
//!     ],
//! );
//! let config = VigilConfig::new().with_base_url("http://localhost:8080");
//! let report = LifecycleManager::new(ScriptedFactory::new(site), config).run_suite(&suite)?;
//! assert!(report.all_passed());
//! # Ok::<(), vigil::VigilError>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod action;
mod assertion;
mod chain;
mod config;
mod dom;
mod fixture;
mod lifecycle;
mod locator;
mod poll;
mod report;
mod result;
mod selector;
mod step;
mod subject;
mod suite;

/// Browser drivers: the [`driver::Driver`] seam, a scripted in-memory
/// driver and, with the `browser` feature, a CDP driver.
pub mod driver;

pub use action::{ActionDispatcher, ActionOutcome};
pub use assertion::{evaluate, AssertionEngine, Evaluation, Predicate};
pub use chain::{ChainExecutor, ChainOutcome, StepFailure};
pub use config::{VigilConfig, CONFIG_FILE_NAME, DEFAULT_PAGE_LOAD_TIMEOUT_MS};
pub use dom::{DomSnapshot, ElementHandle, ElementNode, ElementState, NodeId, ReadyState};
pub use driver::{Driver, DriverFactory, InputEvent};
pub use fixture::{Fixture, FixtureManager, FixtureState, SimpleFixture};
pub use lifecycle::{LifecycleManager, RunListener};
pub use locator::{ElementQuery, Query};
pub use poll::{
    poll, Backoff, CancelToken, PollConfig, PollOutcome, Polled, Poller,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS,
};
pub use report::{Phase, RunReport, StepRecord, TestResult, TestStatus};
pub use result::{AssertionFailure, ErrorKind, VigilError, VigilResult};
pub use selector::{
    resolve, AttrCondition, AttrOperator, Combinator, ComplexSelector, CompoundSelector,
    OpenValueMode, Scope, Selector,
};
pub use step::{Action, Step};
pub use subject::{Subject, SubjectValue};
pub use suite::{PlannedCase, Suite, TestCase, SUITE_VERSION};

/// Prelude for writing suites in Rust
pub mod prelude {
    pub use crate::driver::{
        ClickEffect, ElementScript, PageScript, ScriptedDriver, ScriptedFactory, ScriptedSite,
    };
    pub use crate::{
        Action, LifecycleManager, Predicate, RunReport, Step, Suite, TestCase, TestStatus,
        VigilConfig, VigilError, VigilResult,
    };
}
