//! Run-level fixtures.
//!
//! Fixtures wrap a whole run: a local server to test against, seeded data, a
//! scratch directory. They are set up once before the first test case and
//! torn down once after the last, in reverse setup order.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: a failed setup stops the run before any browser starts
//! - **Heijunka**: ordered setup and teardown give every run the same state

use crate::result::{VigilError, VigilResult};
use std::fmt;
use tracing::{info, warn};

/// Something set up before a run and torn down after it.
///
/// # Example
///
/// ```ignore
/// struct DevServer { child: Option<std::process::Child> }
///
/// impl Fixture for DevServer {
///     fn setup(&mut self) -> VigilResult<()> {
///         self.child = Some(Command::new("npm").arg("start").spawn()?);
///         Ok(())
///     }
///
///     fn teardown(&mut self) -> VigilResult<()> {
///         if let Some(mut child) = self.child.take() {
///             child.kill()?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Fixture: Send {
    /// Set up before the run.
    ///
    /// # Errors
    ///
    /// Returns an error if setup fails; the run does not start.
    fn setup(&mut self) -> VigilResult<()>;

    /// Tear down after the run.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails; it is reported, not fatal.
    fn teardown(&mut self) -> VigilResult<()>;

    /// Name for logs and reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Higher priorities are set up first and torn down last
    fn priority(&self) -> i32 {
        0
    }
}

/// Lifecycle state of a registered fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    /// Registered, not set up
    Registered,
    /// Set up successfully
    SetUp,
    /// Torn down
    TornDown,
    /// Setup or teardown failed
    Failed,
}

struct FixtureEntry {
    fixture: Box<dyn Fixture>,
    state: FixtureState,
}

/// Ordered set of run-level fixtures
#[derive(Default)]
pub struct FixtureManager {
    fixtures: Vec<FixtureEntry>,
    setup_order: Vec<usize>,
}

impl fmt::Debug for FixtureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureManager")
            .field("fixtures", &self.names())
            .field("set_up", &self.setup_order.len())
            .finish()
    }
}

impl FixtureManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture
    pub fn register<F: Fixture + 'static>(&mut self, fixture: F) {
        self.fixtures.push(FixtureEntry {
            fixture: Box::new(fixture),
            state: FixtureState::Registered,
        });
    }

    /// Number of registered fixtures
    #[must_use]
    pub fn count(&self) -> usize {
        self.fixtures.len()
    }

    /// Registered names, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fixtures.iter().map(|e| e.fixture.name()).collect()
    }

    /// State of a fixture by name
    #[must_use]
    pub fn state(&self, name: &str) -> Option<FixtureState> {
        self.fixtures
            .iter()
            .find(|e| e.fixture.name() == name)
            .map(|e| e.state)
    }

    /// Set up every fixture, highest priority first. Registration order
    /// breaks ties.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Fixture`] on the first failure, after tearing
    /// down the fixtures that were already set up.
    pub fn setup_all(&mut self) -> VigilResult<()> {
        let mut order: Vec<usize> = (0..self.fixtures.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.fixtures[i].fixture.priority()));
        self.setup_order.clear();

        for index in order {
            let entry = &mut self.fixtures[index];
            if entry.state == FixtureState::SetUp {
                continue;
            }
            info!(fixture = entry.fixture.name(), "fixture setup");
            if let Err(e) = entry.fixture.setup() {
                entry.state = FixtureState::Failed;
                let message = format!("fixture '{}' setup failed: {e}", entry.fixture.name());
                for problem in self.teardown_all() {
                    warn!(%problem, "teardown after failed setup");
                }
                return Err(VigilError::fixture(message));
            }
            entry.state = FixtureState::SetUp;
            self.setup_order.push(index);
        }
        Ok(())
    }

    /// Tear down in reverse setup order. Every fixture gets its teardown even
    /// if an earlier one fails; the failures are returned.
    pub fn teardown_all(&mut self) -> Vec<String> {
        let mut problems = Vec::new();
        for index in self.setup_order.drain(..).rev() {
            let entry = &mut self.fixtures[index];
            if entry.state != FixtureState::SetUp {
                continue;
            }
            info!(fixture = entry.fixture.name(), "fixture teardown");
            match entry.fixture.teardown() {
                Ok(()) => entry.state = FixtureState::TornDown,
                Err(e) => {
                    entry.state = FixtureState::Failed;
                    problems.push(format!(
                        "fixture '{}' teardown failed: {e}",
                        entry.fixture.name()
                    ));
                }
            }
        }
        problems
    }
}

type Hook = Box<dyn FnMut() -> VigilResult<()> + Send>;

/// A fixture built from closures
pub struct SimpleFixture {
    name: String,
    priority: i32,
    setup_fn: Option<Hook>,
    teardown_fn: Option<Hook>,
}

impl fmt::Debug for SimpleFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleFixture")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

impl SimpleFixture {
    /// Create a fixture that does nothing until given closures
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            setup_fn: None,
            teardown_fn: None,
        }
    }

    /// Set the setup closure
    #[must_use]
    pub fn with_setup<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> VigilResult<()> + Send + 'static,
    {
        self.setup_fn = Some(Box::new(f));
        self
    }

    /// Set the teardown closure
    #[must_use]
    pub fn with_teardown<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> VigilResult<()> + Send + 'static,
    {
        self.teardown_fn = Some(Box::new(f));
        self
    }

    /// Set the priority
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Fixture for SimpleFixture {
    fn setup(&mut self) -> VigilResult<()> {
        self.setup_fn.as_mut().map_or(Ok(()), |f| f())
    }

    fn teardown(&mut self) -> VigilResult<()> {
        self.teardown_fn.as_mut().map_or(Ok(()), |f| f())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
