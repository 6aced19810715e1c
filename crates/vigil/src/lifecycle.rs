//! Test session lifecycle.
//!
//! Every test case gets a fresh browser session:
//!
//! ```text
//! launch ─▶ before_each (outer ─▶ inner) ─▶ steps ─▶ after_each (inner ─▶ outer)
//!                                                           │
//!                                     reset ◀───────────────┘
//!                                       │
//!                                     close (also on early return or panic)
//! ```
//!
//! Teardown runs once per case whether setup, the steps, or nothing failed.
//! A failure in one case never stops its siblings. A session error is
//! different: the browser is gone, so the run is aborted, in-flight polls are
//! cancelled and cases that have not started are reported as skipped.
//!
//! With `workers > 1` cases run concurrently, one session each; results are
//! still reported in declaration order.

use crate::chain::{ChainExecutor, ChainOutcome};
use crate::config::VigilConfig;
use crate::driver::{Driver, DriverFactory};
use crate::fixture::{Fixture, FixtureManager};
use crate::poll::CancelToken;
use crate::report::{Phase, RunReport, StepRecord, TestResult, TestStatus};
use crate::result::{ErrorKind, VigilError, VigilResult};
use crate::suite::{PlannedCase, Suite};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Observes a run as it progresses. Called from worker threads.
pub trait RunListener: Send + Sync {
    /// The run is about to start `total` cases
    fn run_started(&self, _total: usize) {}

    /// A case is about to run
    fn case_started(&self, _title: &str) {}

    /// A case finished, or was skipped
    fn case_finished(&self, _result: &TestResult) {}
}

/// Runs suites, one isolated session per test case
pub struct LifecycleManager {
    factory: Box<dyn DriverFactory>,
    config: VigilConfig,
    fixtures: FixtureManager,
    cancel: CancelToken,
    filter: Option<String>,
    listeners: Vec<Box<dyn RunListener>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.config)
            .field("fixtures", &self.fixtures)
            .field("filter", &self.filter)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Create a manager that launches sessions from `factory`
    pub fn new(factory: impl DriverFactory + 'static, config: VigilConfig) -> Self {
        Self {
            factory: Box::new(factory),
            config,
            fixtures: FixtureManager::new(),
            cancel: CancelToken::new(),
            filter: None,
            listeners: Vec::new(),
        }
    }

    /// Run only cases whose full title contains `pattern`
    #[must_use]
    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Add a run-level fixture
    #[must_use]
    pub fn with_fixture<F: Fixture + 'static>(mut self, fixture: F) -> Self {
        self.fixtures.register(fixture);
        self
    }

    /// Add a progress listener
    #[must_use]
    pub fn with_listener(mut self, listener: impl RunListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Token that cancels the run from outside (e.g. on Ctrl-C). Once
    /// cancelled it stays cancelled; use a new manager for the next run.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one suite.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub fn run_suite(&mut self, suite: &Suite) -> VigilResult<RunReport> {
        self.run(std::slice::from_ref(suite))
    }

    /// Run suites and report every declared case.
    ///
    /// Test failures, and session failures, are reported in the returned
    /// [`RunReport`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error before anything runs if the configuration or a suite
    /// declaration is invalid, or if a run-level fixture fails to set up.
    pub fn run(&mut self, suites: &[Suite]) -> VigilResult<RunReport> {
        self.config.validate()?;
        for suite in suites {
            suite.validate(self.config.open_attribute_values)?;
        }

        let name = match suites {
            [one] => one.name.clone(),
            _ => format!("{} suites", suites.len()),
        };
        let mut report = RunReport::new(name);
        let started = Instant::now();

        let plan: Vec<PlannedCase> = suites.iter().flat_map(Suite::plan).collect();
        let skips = self.select(&plan);

        self.fixtures.setup_all()?;

        let runner = CaseRunner {
            factory: self.factory.as_ref(),
            config: &self.config,
            cancel: &self.cancel,
            listeners: &self.listeners,
            abort: Mutex::new(None),
            stopped: AtomicBool::new(false),
        };
        for listener in &self.listeners {
            listener.run_started(plan.len());
        }

        let workers = self.config.workers.clamp(1, plan.len().max(1));
        info!(run_id = %report.run_id, cases = plan.len(), workers, "run started");
        let results = if workers == 1 {
            plan.iter()
                .zip(&skips)
                .map(|(planned, skip)| runner.run_one(planned, skip.as_deref()))
                .collect()
        } else {
            runner.run_parallel(&plan, &skips, workers)
        };
        let aborted = runner.aborted();

        report.fixture_errors = self.fixtures.teardown_all();
        for problem in &report.fixture_errors {
            warn!(%problem, "fixture teardown");
        }

        report.results = results;
        report.aborted = aborted.or_else(|| {
            self.cancel
                .is_cancelled()
                .then(|| "run cancelled".to_string())
        });
        report.duration_ms = crate::report::millis(started.elapsed());
        info!(summary = %report.summary(), "run finished");
        Ok(report)
    }

    // Skip reason per planned case; `None` means run it.
    fn select(&self, plan: &[PlannedCase]) -> Vec<Option<String>> {
        let exclusive = plan.iter().any(|p| p.case.only);
        plan.iter()
            .map(|planned| {
                if planned.case.skip {
                    Some("marked skip".to_string())
                } else if exclusive && !planned.case.only {
                    Some("another test is marked only".to_string())
                } else if let Some(pattern) = self
                    .filter
                    .as_deref()
                    .filter(|pattern| !planned.full_title().contains(pattern))
                {
                    Some(format!("does not match filter {pattern:?}"))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Per-run state shared by worker threads
struct CaseRunner<'r> {
    factory: &'r dyn DriverFactory,
    config: &'r VigilConfig,
    cancel: &'r CancelToken,
    listeners: &'r [Box<dyn RunListener>],
    abort: Mutex<Option<String>>,
    stopped: AtomicBool,
}

impl CaseRunner<'_> {
    fn aborted(&self) -> Option<String> {
        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn abort_run(&self, cause: &str) {
        let mut abort = self.abort.lock().unwrap_or_else(PoisonError::into_inner);
        if abort.is_none() {
            warn!(cause, "aborting run");
            *abort = Some(cause.to_string());
            self.cancel.cancel();
        }
    }

    fn run_parallel(
        &self,
        plan: &[PlannedCase],
        skips: &[Option<String>],
        workers: usize,
    ) -> Vec<TestResult> {
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<TestResult>>> = Mutex::new(vec![None; plan.len()]);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let _ = scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(planned) = plan.get(index) else {
                        break;
                    };
                    let skip = skips.get(index).and_then(Option::as_deref);
                    let result = self.run_one(planned, skip);
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .zip(plan)
            .map(|(slot, planned)| {
                slot.unwrap_or_else(|| {
                    TestResult::skipped(planned.title_path.clone(), "worker stopped")
                })
            })
            .collect()
    }

    fn run_one(&self, planned: &PlannedCase, skip: Option<&str>) -> TestResult {
        let skip_reason = skip.map(str::to_string).or_else(|| {
            if let Some(cause) = self.aborted() {
                Some(format!("run aborted: {cause}"))
            } else if self.cancel.is_cancelled() {
                Some("run cancelled".to_string())
            } else if self.stopped.load(Ordering::SeqCst) {
                Some("fail-fast: an earlier test failed".to_string())
            } else {
                None
            }
        });

        let result = match skip_reason {
            Some(reason) => TestResult::skipped(planned.title_path.clone(), reason),
            None => {
                for listener in self.listeners {
                    listener.case_started(&planned.full_title());
                }
                self.run_case(planned)
            }
        };

        if result.status.is_failed() && self.config.fail_fast {
            self.stopped.store(true, Ordering::SeqCst);
        }
        for listener in self.listeners {
            listener.case_finished(&result);
        }
        result
    }

    fn run_case(&self, planned: &PlannedCase) -> TestResult {
        let title = planned.full_title();
        let span = info_span!("test", title = %title);
        let _enter = span.enter();
        let started = Instant::now();

        let config = match planned.case.timeout_ms {
            Some(ms) => self.config.clone().with_command_timeout_ms(ms),
            None => self.config.clone(),
        };

        let driver = match self.factory.launch() {
            Ok(driver) => driver,
            Err(error) => {
                let cause = format!("could not launch a session: {error}");
                self.abort_run(&cause);
                return TestResult::new(
                    planned.title_path.clone(),
                    TestStatus::Errored { cause },
                    started.elapsed(),
                );
            }
        };
        let mut session = Session::new(driver);
        let mut case = CaseOutcome::default();

        {
            let mut executor = ChainExecutor::new(session.driver(), &config, self.cancel.clone());
            for hook in &planned.before {
                case.absorb(executor.execute(hook), Phase::Setup);
                if !case.status.is_passed() {
                    break;
                }
            }
            if case.status.is_passed() {
                case.absorb(executor.execute(&planned.case.steps), Phase::Test);
            }
        }
        {
            // Teardown ignores run cancellation: every after_each step is
            // attempted once per case, even after an abort.
            let mut executor = ChainExecutor::new(session.driver(), &config, CancelToken::new());
            for hook in &planned.after {
                case.absorb(executor.execute(hook), Phase::Teardown);
            }
        }

        if case.fatal.is_none() {
            if let Err(error) = session.driver().reset() {
                warn!(%error, "session reset failed");
                case.note_error(&error);
            }
        }
        if let Err(error) = session.close() {
            warn!(%error, "session close failed");
        }

        if let Some(cause) = &case.fatal {
            self.abort_run(cause);
        }
        let status = case.final_status(self.aborted());
        info!(status = status.label(), "test finished");
        TestResult::new(planned.title_path.clone(), status, started.elapsed()).with_steps(case.records)
    }
}

/// Step records and status accumulated across one case's chains
struct CaseOutcome {
    records: Vec<StepRecord>,
    status: TestStatus,
    fatal: Option<String>,
}

impl Default for CaseOutcome {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            status: TestStatus::Passed,
            fatal: None,
        }
    }
}

impl CaseOutcome {
    // The first failure decides the status; later ones (e.g. in teardown)
    // only add records.
    fn absorb(&mut self, outcome: ChainOutcome, phase: Phase) {
        self.records
            .extend(outcome.records.into_iter().map(|r| r.in_phase(phase)));
        if let Some(failure) = outcome.failure {
            self.note_error(&failure.error);
            if self.status.is_passed() {
                self.status = TestStatus::failed(phase, failure.index, failure.step, &failure.error);
            }
        }
    }

    fn note_error(&mut self, error: &VigilError) {
        if error.is_fatal() && self.fatal.is_none() {
            self.fatal = Some(error.to_string());
        }
    }

    fn final_status(&self, aborted: Option<String>) -> TestStatus {
        if let Some(cause) = &self.fatal {
            return TestStatus::Errored {
                cause: cause.clone(),
            };
        }
        match &self.status {
            TestStatus::Failed {
                kind: ErrorKind::Cancelled,
                reason,
                ..
            } => TestStatus::Errored {
                cause: aborted.map_or_else(|| reason.clone(), |cause| format!("run aborted: {cause}")),
            },
            other => other.clone(),
        }
    }
}

/// Owns a session and closes it exactly once, even on unwind
struct Session {
    driver: Box<dyn Driver>,
    open: bool,
}

impl Session {
    fn new(driver: Box<dyn Driver>) -> Self {
        Self { driver, open: true }
    }

    fn driver(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    fn close(&mut self) -> VigilResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.driver.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.open {
            let _ = self.driver.close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::assertion::Predicate;
    use crate::driver::{ElementScript, PageScript, ScriptedFactory, ScriptedSite};
    use crate::step::Step;
    use std::sync::Arc;

    fn site() -> ScriptedSite {
        ScriptedSite::new()
            .page(
                "/",
                PageScript::new("Home").element(ElementScript::new("h1").text("Welcome")),
            )
            .page("/teardown", PageScript::new("Bye"))
    }

    fn config() -> VigilConfig {
        VigilConfig::default()
            .with_base_url("http://localhost:8080")
            .with_command_timeout_ms(200)
            .with_poll_interval_ms(10)
    }

    fn title_is(title: &str) -> Vec<Step> {
        vec![
            Step::visit("/"),
            Step::title(),
            Step::assert(Predicate::Equals(title.into())),
        ]
    }

    fn manager(factory: &ScriptedFactory, config: VigilConfig) -> LifecycleManager {
        LifecycleManager::new(factory.clone(), config)
    }

    mod isolation {
        use super::*;

        #[test]
        fn test_one_session_per_case() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("home")
                .it("a", title_is("Home"))
                .it("b", title_is("Home"));
            let report = manager(&factory, config()).run_suite(&suite).unwrap();

            assert!(report.all_passed(), "{}", report.summary());
            assert_eq!(factory.calls().count("launch"), 2);
            assert_eq!(factory.calls().count("reset"), 2);
            assert_eq!(factory.calls().count("close"), 2);
        }

        #[test]
        fn test_failure_does_not_stop_siblings() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("home")
                .it("fails", title_is("Nope"))
                .it("passes", title_is("Home"));
            let report = manager(&factory, config()).run_suite(&suite).unwrap();

            assert_eq!(report.failed_count(), 1);
            assert_eq!(report.passed_count(), 1);
            assert!(report.aborted.is_none());
            match &report.results[0].status {
                TestStatus::Failed {
                    phase, step_index, ..
                } => {
                    assert_eq!(*phase, Phase::Test);
                    assert_eq!(*step_index, 2);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    mod hooks {
        use super::*;

        fn suite_with_teardown(steps: Vec<Step>) -> Suite {
            Suite::describe("hooks")
                .after_each(vec![Step::visit("/teardown")])
                .it("case", steps)
        }

        fn teardown_count(factory: &ScriptedFactory) -> usize {
            factory
                .calls()
                .count("navigate:http://localhost:8080/teardown")
        }

        #[test]
        fn test_teardown_once_after_pass() {
            let factory = ScriptedFactory::new(site());
            let report = manager(&factory, config())
                .run_suite(&suite_with_teardown(title_is("Home")))
                .unwrap();
            assert!(report.all_passed());
            assert_eq!(teardown_count(&factory), 1);
        }

        #[test]
        fn test_teardown_once_after_step_failure() {
            let factory = ScriptedFactory::new(site());
            let report = manager(&factory, config())
                .run_suite(&suite_with_teardown(title_is("Nope")))
                .unwrap();
            assert_eq!(report.failed_count(), 1);
            assert_eq!(teardown_count(&factory), 1);
        }

        #[test]
        fn test_teardown_once_after_setup_failure() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("hooks")
                .before_each(vec![Step::visit("/"), Step::locate("#never")])
                .after_each(vec![Step::visit("/teardown")])
                .it("case", title_is("Home"));
            let report = manager(&factory, config()).run_suite(&suite).unwrap();

            match &report.results[0].status {
                TestStatus::Failed { phase, .. } => assert_eq!(*phase, Phase::Setup),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(teardown_count(&factory), 1);
            // the test's own visit never ran
            let home_visits = factory
                .calls()
                .history()
                .iter()
                .filter(|c| *c == "navigate:http://localhost:8080/")
                .count();
            assert_eq!(home_visits, 1);
        }

        struct CancelOnStart(CancelToken);

        impl RunListener for CancelOnStart {
            fn case_started(&self, _title: &str) {
                self.0.cancel();
            }
        }

        #[test]
        fn test_teardown_runs_after_cancellation() {
            let factory = ScriptedFactory::new(site());
            let manager = manager(&factory, config());
            let token = manager.cancel_token();
            let report = manager
                .with_listener(CancelOnStart(token))
                .run_suite(&suite_with_teardown(title_is("Home")))
                .unwrap();

            let result = &report.results[0];
            assert!(matches!(result.status, TestStatus::Errored { .. }));
            assert_eq!(teardown_count(&factory), 1);
            let teardown: Vec<_> = result
                .steps
                .iter()
                .filter(|r| r.phase == Phase::Teardown)
                .collect();
            assert_eq!(teardown.len(), 1);
            assert!(teardown[0].error.is_none());
        }

        #[test]
        fn test_teardown_failure_fails_passing_case() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("hooks")
                .after_each(vec![Step::locate("#never")])
                .it("case", title_is("Home"));
            let report = manager(&factory, config()).run_suite(&suite).unwrap();
            match &report.results[0].status {
                TestStatus::Failed { phase, .. } => assert_eq!(*phase, Phase::Teardown),
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn test_nested_hook_order() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("outer")
                .before_each(vec![Step::visit("/outer-setup")])
                .after_each(vec![Step::visit("/outer-teardown")])
                .suite(
                    Suite::describe("inner")
                        .before_each(vec![Step::visit("/inner-setup")])
                        .after_each(vec![Step::visit("/inner-teardown")])
                        .it("case", vec![Step::visit("/case")]),
                );
            manager(&factory, config()).run_suite(&suite).unwrap();

            let navigations: Vec<String> = factory
                .calls()
                .history()
                .into_iter()
                .filter_map(|c| {
                    c.strip_prefix("navigate:http://localhost:8080")
                        .map(str::to_string)
                })
                .collect();
            assert_eq!(
                navigations,
                vec![
                    "/outer-setup",
                    "/inner-setup",
                    "/case",
                    "/inner-teardown",
                    "/outer-teardown",
                ]
            );
        }
    }

    mod selection {
        use super::*;
        use crate::suite::TestCase;

        #[test]
        fn test_skip_only_and_filter() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("sel")
                .test(TestCase::new("skipped", title_is("Home")).skipped())
                .test(TestCase::new("focused", title_is("Home")).exclusive())
                .it("other", title_is("Home"));
            let report = manager(&factory, config()).run_suite(&suite).unwrap();
            let labels: Vec<_> = report.results.iter().map(|r| r.status.label()).collect();
            assert_eq!(labels, vec!["skipped", "passed", "skipped"]);

            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("sel")
                .it("alpha", title_is("Home"))
                .it("beta", title_is("Home"));
            let report = manager(&factory, config())
                .with_filter("beta")
                .run_suite(&suite)
                .unwrap();
            assert_eq!(report.passed_count(), 1);
            assert_eq!(report.skipped_count(), 1);
            assert_eq!(factory.calls().count("launch"), 1);
        }

        #[test]
        fn test_fail_fast_skips_the_rest() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("ff")
                .it("fails", title_is("Nope"))
                .it("never runs", title_is("Home"));
            let report = manager(&factory, config().with_fail_fast(true))
                .run_suite(&suite)
                .unwrap();
            assert_eq!(report.failed_count(), 1);
            assert_eq!(report.skipped_count(), 1);
            assert_eq!(factory.calls().count("launch"), 1);
        }
    }

    mod aborts {
        use super::*;
        use crate::driver::ScriptedDriver;
        use crate::fixture::SimpleFixture;

        struct DyingDriver;

        impl Driver for DyingDriver {
            fn navigate(&mut self, _url: &str) -> VigilResult<()> {
                Err(VigilError::session("browser crashed"))
            }

            fn query_dom(&mut self) -> VigilResult<crate::dom::DomSnapshot> {
                Err(VigilError::session("browser crashed"))
            }

            fn dispatch_input(&mut self, _event: &crate::driver::InputEvent) -> VigilResult<()> {
                Err(VigilError::session("browser crashed"))
            }
        }

        #[test]
        fn test_session_error_aborts_run() {
            let launches = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&launches);
            let factory = move || -> VigilResult<Box<dyn Driver>> {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(DyingDriver))
            };
            let suite = Suite::describe("crash")
                .it("first", title_is("Home"))
                .it("second", title_is("Home"));
            let report = LifecycleManager::new(factory, config())
                .run_suite(&suite)
                .unwrap();

            assert!(matches!(report.results[0].status, TestStatus::Errored { .. }));
            assert!(report.results[1].status.is_skipped());
            assert!(report.aborted.as_deref().unwrap().contains("browser crashed"));
            assert_eq!(launches.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_launch_failure_aborts_run() {
            let factory =
                || -> VigilResult<Box<dyn Driver>> { Err(VigilError::session("no browser")) };
            let suite = Suite::describe("crash").it("only", title_is("Home"));
            let report = LifecycleManager::new(factory, config())
                .run_suite(&suite)
                .unwrap();
            assert!(matches!(report.results[0].status, TestStatus::Errored { .. }));
            assert!(!report.all_passed());
        }

        #[test]
        fn test_invalid_declaration_is_rejected_before_launch() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("bad").it("case", vec![Step::locate("a[")]);
            assert!(manager(&factory, config()).run_suite(&suite).is_err());
            assert_eq!(factory.calls().count("launch"), 0);
        }

        #[test]
        fn test_fixture_setup_failure_stops_run() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("fx").it("case", title_is("Home"));
            let err = manager(&factory, config())
                .with_fixture(
                    SimpleFixture::new("server").with_setup(|| Err(VigilError::fixture("port taken"))),
                )
                .run_suite(&suite)
                .unwrap_err();
            assert!(matches!(err, VigilError::Fixture { .. }));
            assert_eq!(factory.calls().count("launch"), 0);
        }

        #[test]
        fn test_external_cancel_skips_everything() {
            let factory = ScriptedFactory::new(site());
            let suite = Suite::describe("cancel").it("case", title_is("Home"));
            let mut manager = manager(&factory, config());
            manager.cancel_token().cancel();
            let report = manager.run_suite(&suite).unwrap();
            assert!(report.results[0].status.is_skipped());
            assert_eq!(report.aborted.as_deref(), Some("run cancelled"));
        }

        #[test]
        fn test_scripted_driver_is_send() {
            fn assert_send<T: Send>() {}
            assert_send::<ScriptedDriver>();
        }
    }

    mod parallel {
        use super::*;

        #[test]
        fn test_results_keep_declaration_order() {
            let factory = ScriptedFactory::new(site());
            let mut suite = Suite::describe("many");
            for i in 0..6 {
                let title = if i % 2 == 0 { "Home" } else { "Nope" };
                suite = suite.it(format!("case {i}"), title_is(title));
            }
            let report = manager(&factory, config().with_workers(3))
                .run_suite(&suite)
                .unwrap();

            let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
            assert_eq!(
                names,
                vec!["case 0", "case 1", "case 2", "case 3", "case 4", "case 5"]
            );
            assert_eq!(report.passed_count(), 3);
            assert_eq!(report.failed_count(), 3);
            assert_eq!(factory.calls().count("launch"), 6);
            assert_eq!(factory.calls().count("close"), 6);
        }
    }

    mod listeners {
        use super::*;

        #[derive(Clone, Default)]
        struct Recorder(Arc<Mutex<Vec<String>>>);

        impl RunListener for Recorder {
            fn run_started(&self, total: usize) {
                self.0.lock().unwrap().push(format!("start:{total}"));
            }

            fn case_finished(&self, result: &TestResult) {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("{}:{}", result.name, result.status.label()));
            }
        }

        #[test]
        fn test_listener_sees_every_case() {
            let factory = ScriptedFactory::new(site());
            let recorder = Recorder::default();
            let suite = Suite::describe("l")
                .it("a", title_is("Home"))
                .test(crate::suite::TestCase::new("b", title_is("Home")).skipped());
            let _ = manager(&factory, config())
                .with_listener(recorder.clone())
                .run_suite(&suite)
                .unwrap();
            assert_eq!(
                *recorder.0.lock().unwrap(),
                vec!["start:2", "a:passed", "b:skipped"]
            );
        }
    }
}
