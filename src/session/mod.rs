//! Session orchestration
//!
//! A session runs a set of suites across a set of environments. Each
//! environment gets its own disjoint suite instances and a driver that
//! consumes the environment's inbound messages; batch sessions run under a
//! global time budget and degrade to a partial, timed-out result when it
//! elapses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::environment::{EnvironmentDescriptor, EnvironmentHandle, EnvironmentLauncher};
use crate::models::{EnvMessage, SessionResult, SuiteResult, TestMeta, TestRun};
use crate::scheduler::{Execution, ExecutionCoordinator};
use crate::suite::{Suite, SuiteOptions};

/// Default batch budget; interactive sessions run unwatched
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

static SESSION_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session requires at least one environment")]
    NoEnvironments,

    #[error("every environment failed to launch")]
    AllLaunchesFailed,

    #[error("empty session plan: {0}")]
    EmptyPlan(String),
}

/// Interactive sessions serve a person and never time out on their own;
/// batch sessions answer to a TTL watcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionMode {
    Interactive,
    #[default]
    Batch,
}

/// One suite's declaration as known up front
#[derive(Clone, Debug)]
pub struct SuitePlan {
    pub name: String,
    /// Test resource reference injected into each environment
    pub resource: Option<String>,
    pub tests: Vec<TestMeta>,
}

impl SuitePlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: None,
            tests: Vec::new(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_test(mut self, meta: TestMeta) -> Self {
        self.tests.push(meta);
        self
    }
}

/// The suites and tests a session declares before any environment reports
#[derive(Clone, Debug, Default)]
pub struct SessionPlan {
    pub suites: Vec<SuitePlan>,
}

impl SessionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suite(mut self, suite: SuitePlan) -> Self {
        self.suites.push(suite);
        self
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.suites.is_empty() {
            return Err(SessionError::EmptyPlan("no suites declared".to_string()));
        }
        for suite in &self.suites {
            if suite.tests.is_empty() {
                return Err(SessionError::EmptyPlan(format!(
                    "suite '{}' declares no tests",
                    suite.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub mode: SessionMode,
    /// Global budget; None lets the session run to natural completion
    pub ttl: Option<Duration>,
    /// Knobs applied to every suite the session creates
    pub suite: SuiteOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: SessionMode::Batch,
            ttl: Some(DEFAULT_SESSION_TTL),
            suite: SuiteOptions::default(),
        }
    }
}

/// Routes one environment's messages into its suite set
struct EnvironmentDriver {
    label: String,
    suite_options: SuiteOptions,
    coordinators: Mutex<Vec<Arc<ExecutionCoordinator>>>,
    pending: Mutex<HashMap<(String, String), oneshot::Sender<TestRun>>>,
}

impl EnvironmentDriver {
    fn new(label: String, suite_options: SuiteOptions) -> Self {
        Self {
            label,
            suite_options,
            coordinators: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn coordinators_lock(&self) -> MutexGuard<'_, Vec<Arc<ExecutionCoordinator>>> {
        self.coordinators.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<(String, String), oneshot::Sender<TestRun>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_suite(&self, name: &str) -> Arc<ExecutionCoordinator> {
        let mut coordinators = self.coordinators_lock();
        if let Some(existing) = coordinators.iter().find(|c| c.suite().name() == name) {
            return Arc::clone(existing);
        }
        debug!("environment {}: suite '{name}' created", self.label);
        let suite = Suite::with_options(name, self.suite_options.clone());
        let coordinator = Arc::new(ExecutionCoordinator::new(suite));
        coordinators.push(Arc::clone(&coordinator));
        coordinator
    }

    /// Single entry point for plan pre-registration and live messages alike
    fn handle_message(&self, message: EnvMessage) {
        match message {
            EnvMessage::TestAdded {
                suite_name,
                test_meta,
            } => {
                let coordinator = self.ensure_suite(&suite_name);
                let test_name = test_meta.name.trim().to_string();
                match coordinator.suite().add_test(test_meta) {
                    Ok(id) => {
                        let (tx, rx) = oneshot::channel();
                        self.pending_lock().insert((suite_name, test_name), tx);
                        coordinator.dispatch(id, Execution::Reported(rx));
                    }
                    Err(e) => {
                        warn!("environment {}: dropping registration: {e}", self.label)
                    }
                }
            }
            EnvMessage::TestEnded {
                suite_name,
                test_name,
                run,
            } => {
                let key = (suite_name, test_name.trim().to_string());
                match self.pending_lock().remove(&key) {
                    Some(tx) => {
                        let _ = tx.send(run);
                    }
                    None => warn!(
                        "environment {}: settlement for unknown test '{}' in suite '{}'",
                        self.label, key.1, key.0
                    ),
                }
            }
        }
    }

    fn suites(&self) -> Vec<Arc<Suite>> {
        self.coordinators_lock()
            .iter()
            .map(|c| Arc::clone(c.suite()))
            .collect()
    }

    /// Aggregates in declaration order, attributed to this environment
    fn snapshot(&self) -> Vec<SuiteResult> {
        self.suites()
            .iter()
            .map(|suite| suite.snapshot().with_environment(self.label.clone()))
            .collect()
    }
}

struct EnvironmentRun {
    handle: Arc<EnvironmentHandle>,
    driver: Arc<EnvironmentDriver>,
}

/// Runs sessions: launch environments, drive suites, aggregate results
pub struct SessionManager {
    launcher: EnvironmentLauncher,
    options: SessionOptions,
}

impl SessionManager {
    pub fn new(launcher: EnvironmentLauncher) -> Self {
        Self::with_options(launcher, SessionOptions::default())
    }

    pub fn with_options(launcher: EnvironmentLauncher, options: SessionOptions) -> Self {
        Self { launcher, options }
    }

    /// Run one session over the given environments. `connect` is invoked for
    /// every successfully launched environment so the transport collaborator
    /// can wire its message sender before any test is awaited.
    pub async fn run<C>(
        &self,
        descriptors: &[EnvironmentDescriptor],
        plan: &SessionPlan,
        connect: C,
    ) -> Result<SessionResult, SessionError>
    where
        C: Fn(&EnvironmentDescriptor, &Arc<EnvironmentHandle>),
    {
        if descriptors.is_empty() {
            return Err(SessionError::NoEnvironments);
        }
        plan.validate()?;

        let session_id = SESSION_ID_SOURCE.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            "starting test session #{session_id} ({} suites, {} environments)...",
            plan.suites.len(),
            descriptors.len()
        );

        let mut environments: Vec<EnvironmentRun> = Vec::new();
        for (descriptor, outcome) in self.launcher.launch_all(descriptors).await {
            let handle = match outcome {
                Ok(handle) => Arc::new(handle),
                // launch_all already logged the failure
                Err(_) => continue,
            };
            let driver = Arc::new(EnvironmentDriver::new(
                descriptor.label(),
                self.options.suite.clone(),
            ));

            if let Some(mut messages) = handle.take_messages() {
                let reader = Arc::clone(&driver);
                tokio::spawn(async move {
                    while let Some(message) = messages.recv().await {
                        reader.handle_message(message);
                    }
                });
            }
            connect(&descriptor, &handle);

            for suite in &plan.suites {
                if let Some(resource) = &suite.resource {
                    handle.inject(resource.clone());
                }
                for meta in &suite.tests {
                    driver.handle_message(EnvMessage::TestAdded {
                        suite_name: suite.name.clone(),
                        test_meta: meta.clone(),
                    });
                }
            }

            environments.push(EnvironmentRun { handle, driver });
        }

        if environments.is_empty() {
            return Err(SessionError::AllLaunchesFailed);
        }

        let drivers: Vec<Arc<EnvironmentDriver>> = environments
            .iter()
            .map(|env| Arc::clone(&env.driver))
            .collect();
        let ttl = match self.options.mode {
            SessionMode::Batch => self.options.ttl,
            SessionMode::Interactive => None,
        };
        let timed_out = match ttl {
            Some(budget) => {
                info!("session time out watcher set to {}ms", budget.as_millis());
                tokio::time::timeout(budget, Self::wait_all_done(&drivers))
                    .await
                    .is_err()
            }
            None => {
                Self::wait_all_done(&drivers).await;
                false
            }
        };
        if timed_out {
            warn!("session #{session_id}: budget elapsed, finalizing with partial results");
        }

        let mut suites = Vec::new();
        for env in &environments {
            let results = env.driver.snapshot();
            env.handle.fulfill(results.clone());
            suites.extend(results);
        }
        for env in &environments {
            env.handle.dispose().await;
        }

        let duration = (Instant::now() - started).as_secs_f64() * 1000.0;
        let result = SessionResult::new(session_id, started_at, suites, duration, timed_out);
        info!(
            "... session #{session_id} done ({:.1}ms): {}",
            result.duration, result.totals
        );
        Ok(result)
    }

    /// Resolves once every suite known across every driver has finalized;
    /// suites may keep appearing while earlier ones are awaited.
    async fn wait_all_done(drivers: &[Arc<EnvironmentDriver>]) {
        loop {
            let suites: Vec<Arc<Suite>> = drivers.iter().flat_map(|d| d.suites()).collect();
            join_all(suites.iter().map(|suite| suite.wait_done())).await;

            let after: Vec<Arc<Suite>> = drivers.iter().flat_map(|d| d.suites()).collect();
            if after.iter().all(|suite| suite.is_finalized()) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{
        BrowserAutomation, BrowserKind, BrowserSession, LaunchError,
    };
    use crate::models::{SuiteResult, TestStatus};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeAutomation {
        fail_navigate: bool,
    }

    impl FakeAutomation {
        fn new() -> Self {
            Self {
                fail_navigate: false,
            }
        }

        fn failing_navigation() -> Self {
            Self {
                fail_navigate: true,
            }
        }
    }

    #[async_trait]
    impl BrowserAutomation for FakeAutomation {
        async fn open(&self, _kind: BrowserKind) -> Result<BrowserSession, LaunchError> {
            Ok(BrowserSession {
                session_id: "fake".to_string(),
            })
        }

        async fn navigate(&self, _session: &BrowserSession, _url: &str) -> Result<(), LaunchError> {
            if self.fail_navigate {
                return Err(LaunchError::Protocol {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }

        async fn close(&self, _session: &BrowserSession) -> Result<(), LaunchError> {
            Ok(())
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(EnvironmentLauncher::new(
            Arc::new(FakeAutomation::new()),
            "http://localhost:9000/run",
        ))
    }

    fn checkout_plan() -> SessionPlan {
        SessionPlan::new().with_suite(
            SuitePlan::new("checkout")
                .with_resource("suites/checkout.js")
                .with_test(TestMeta::new("adds to cart"))
                .with_test(TestMeta::new("pays").synchronous()),
        )
    }

    fn respond_all(handle: &Arc<EnvironmentHandle>, suite: &str, tests: &[&str]) {
        let sender = handle.message_sender();
        let suite = suite.to_string();
        let tests: Vec<String> = tests.iter().map(|t| t.to_string()).collect();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            for name in tests {
                let _ = sender.send(EnvMessage::TestEnded {
                    suite_name: suite.clone(),
                    test_name: name,
                    run: TestRun::passed(3.0),
                });
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn batch_session_runs_across_environments() {
        let descriptors = vec![
            EnvironmentDescriptor::interactive(),
            EnvironmentDescriptor::browser(BrowserKind::Chromium),
        ];

        let result = manager()
            .run(&descriptors, &checkout_plan(), |_descriptor, handle| {
                respond_all(handle, "checkout", &["adds to cart", "pays"]);
            })
            .await
            .unwrap();

        assert!(!result.timed_out);
        assert_eq!(result.suites.len(), 2);
        assert_eq!(result.totals.tests, 4);
        assert_eq!(result.totals.passed, 4);
        assert_eq!(result.suites[0].environment.as_deref(), Some("interactive"));
        assert_eq!(result.suites[1].environment.as_deref(), Some("chromium"));
        assert!(result.suites.iter().all(|s| s.duration.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_elapse_yields_partial_timed_out_result() {
        let manager = SessionManager::with_options(
            EnvironmentLauncher::new(Arc::new(FakeAutomation::new()), "http://localhost:9000/run"),
            SessionOptions {
                ttl: Some(Duration::from_millis(1000)),
                ..SessionOptions::default()
            },
        );
        let plan = SessionPlan::new().with_suite(
            SuitePlan::new("slow").with_test(TestMeta::new("never settles").long_running()),
        );

        let result = manager
            .run(&[EnvironmentDescriptor::interactive()], &plan, |_, _| {})
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!((result.duration - 1000.0).abs() < 5.0);
        assert_eq!(result.totals.tests, 1);
        assert_eq!(result.totals.passed, 0);
        assert_eq!(result.suites[0].done, 0);
        assert_eq!(result.suites[0].tests[0].status, TestStatus::Running);
        assert!(result.suites[0].duration.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_launch_does_not_stop_siblings() {
        let manager = SessionManager::new(EnvironmentLauncher::new(
            Arc::new(FakeAutomation::failing_navigation()),
            "http://localhost:9000/run",
        ));
        let descriptors = vec![
            EnvironmentDescriptor::browser(BrowserKind::Chromium),
            EnvironmentDescriptor::interactive(),
        ];

        let result = manager
            .run(&descriptors, &checkout_plan(), |_descriptor, handle| {
                respond_all(handle, "checkout", &["adds to cart", "pays"]);
            })
            .await
            .unwrap();

        assert_eq!(result.suites.len(), 1);
        assert_eq!(result.suites[0].environment.as_deref(), Some("interactive"));
        assert_eq!(result.totals.passed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failed_launches_are_fatal() {
        let manager = SessionManager::new(EnvironmentLauncher::new(
            Arc::new(FakeAutomation::failing_navigation()),
            "http://localhost:9000/run",
        ));

        let err = manager
            .run(
                &[EnvironmentDescriptor::browser(BrowserKind::Webkit)],
                &checkout_plan(),
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AllLaunchesFailed));
    }

    #[tokio::test]
    async fn hollow_plans_are_rejected() {
        let err = manager()
            .run(
                &[EnvironmentDescriptor::interactive()],
                &SessionPlan::new(),
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyPlan(_)));

        let plan = SessionPlan::new().with_suite(SuitePlan::new("hollow"));
        let err = manager()
            .run(&[EnvironmentDescriptor::interactive()], &plan, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyPlan(_)));
    }

    #[tokio::test]
    async fn session_without_environments_is_rejected() {
        let err = manager()
            .run(&[], &checkout_plan(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoEnvironments));
    }

    #[tokio::test(start_paused = true)]
    async fn driven_environment_can_add_suites() {
        let plan = SessionPlan::new()
            .with_suite(SuitePlan::new("planned").with_test(TestMeta::new("known")));

        let result = manager()
            .run(&[EnvironmentDescriptor::interactive()], &plan, |_, handle| {
                let sender = handle.message_sender();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    let _ = sender.send(EnvMessage::TestAdded {
                        suite_name: "adhoc".to_string(),
                        test_meta: TestMeta::new("extra"),
                    });
                    let _ = sender.send(EnvMessage::TestEnded {
                        suite_name: "planned".to_string(),
                        test_name: "known".to_string(),
                        run: TestRun::passed(1.0),
                    });
                    let _ = sender.send(EnvMessage::TestEnded {
                        suite_name: "adhoc".to_string(),
                        test_name: "extra".to_string(),
                        run: TestRun::passed(1.0),
                    });
                });
            })
            .await
            .unwrap();

        assert_eq!(result.suites.len(), 2);
        assert_eq!(result.suites[0].name, "planned");
        assert_eq!(result.suites[1].name, "adhoc");
        assert_eq!(result.totals.passed, 2);
        assert!(!result.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn result_slot_is_fulfilled_per_environment() {
        let (probe_tx, probe_rx) = oneshot::channel::<Option<Vec<SuiteResult>>>();
        let slot = StdMutex::new(Some(probe_tx));

        let result = manager()
            .run(
                &[EnvironmentDescriptor::interactive()],
                &checkout_plan(),
                move |_, handle| {
                    respond_all(handle, "checkout", &["adds to cart", "pays"]);
                    if let Some(tx) = slot.lock().unwrap().take() {
                        let handle = Arc::clone(handle);
                        tokio::spawn(async move {
                            let _ = tx.send(handle.await_result().await);
                        });
                    }
                },
            )
            .await
            .unwrap();

        let delivered = probe_rx.await.unwrap().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].passed, 2);
        assert_eq!(delivered[0].passed, result.suites[0].passed);
    }

    #[tokio::test(start_paused = true)]
    async fn session_ids_increase() {
        let manager = manager();
        let first = manager
            .run(&[EnvironmentDescriptor::interactive()], &checkout_plan(), |_, handle| {
                respond_all(handle, "checkout", &["adds to cart", "pays"]);
            })
            .await
            .unwrap();
        let second = manager
            .run(&[EnvironmentDescriptor::interactive()], &checkout_plan(), |_, handle| {
                respond_all(handle, "checkout", &["adds to cart", "pays"]);
            })
            .await
            .unwrap();
        assert!(second.session_id > first.session_id);
    }
}
