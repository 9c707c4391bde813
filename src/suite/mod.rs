//! Suite state machine
//!
//! An append-only, ordered collection of tests with aggregate counters, a
//! typed event channel, and a debounced completion signal that fires exactly
//! once. Registrations may keep arriving while tests already run; completion
//! is only declared after a probing delay during which nothing new appeared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{SuiteResult, TestFault, TestMeta, TestResult, TestRun, TestStatus};

/// Wait after the last settlement before declaring a suite complete
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(96);

/// Time budget for a test that declares none of its own
pub const DEFAULT_TEST_TTL: Duration = Duration::from_millis(3000);

static SUITE_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

/// Tuning knobs applied to one suite
#[derive(Clone, Debug)]
pub struct SuiteOptions {
    /// Fast-skip every not-yet-dispatched test
    pub skip: bool,

    /// Quiescence window armed after each potential completion
    pub probe_delay: Duration,

    /// Default per-test time budget; None disables the timer suite-wide
    pub default_ttl: Option<Duration>,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            skip: false,
            probe_delay: DEFAULT_PROBE_DELAY,
            default_ttl: Some(DEFAULT_TEST_TTL),
        }
    }
}

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("suite '{0}' is closed for registration")]
    RegistrationClosed(String),

    #[error("invalid test declaration: {0}")]
    InvalidTest(String),

    #[error("suite '{suite}' has no test named '{test}'")]
    UnknownTest { suite: String, test: String },

    #[error("suite '{0}' declares no tests")]
    Empty(String),
}

/// Notification published on a suite's event channel
#[derive(Clone, Debug)]
pub enum SuiteEvent {
    TestAdded {
        suite: String,
        meta: TestMeta,
    },
    TestFinished {
        suite: String,
        test: String,
        run: TestRun,
    },
    Finished {
        result: SuiteResult,
    },
}

/// One registered test and its lifecycle state
#[derive(Clone, Debug)]
pub struct TestUnit {
    pub id: usize,
    pub meta: TestMeta,
    pub status: TestStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    /// Milliseconds; reported by the executing side or measured here
    pub duration: Option<f64>,
    pub fault: Option<TestFault>,
}

impl TestUnit {
    fn new(id: usize, meta: TestMeta) -> Self {
        Self {
            id,
            meta,
            status: TestStatus::Queued,
            started_at: None,
            ended_at: None,
            duration: None,
            fault: None,
        }
    }

    fn to_result(&self) -> TestResult {
        TestResult {
            name: self.meta.name.clone(),
            status: self.status,
            duration: self.duration,
            error: self.fault.clone(),
        }
    }
}

struct SuiteState {
    tests: Vec<TestUnit>,
    done: usize,
    passed: usize,
    failed: usize,
    errored: usize,
    skipped: usize,
    skip_all: bool,
    started_at: Option<Instant>,
    duration: Option<f64>,
    finalized: bool,
}

/// Named, ordered collection of tests under one environment
pub struct Suite {
    name: String,
    id: u64,
    probe_delay: Duration,
    default_ttl: Option<Duration>,
    state: Mutex<SuiteState>,
    events: broadcast::Sender<SuiteEvent>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_options(name, SuiteOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: SuiteOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let (done_tx, done_rx) = watch::channel(false);
        Arc::new(Self {
            name: name.into(),
            id: SUITE_ID_SOURCE.fetch_add(1, Ordering::Relaxed),
            probe_delay: options.probe_delay,
            default_ttl: options.default_ttl,
            state: Mutex::new(SuiteState {
                tests: Vec::new(),
                done: 0,
                passed: 0,
                failed: 0,
                errored: 0,
                skipped: 0,
                skip_all: options.skip,
                started_at: None,
                duration: None,
                finalized: false,
            }),
            events,
            done_tx,
            done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn probe_delay(&self) -> Duration {
        self.probe_delay
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Subscribe to this suite's notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SuiteEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, SuiteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register one more test; suites accept registrations until finalized
    pub fn add_test(&self, meta: TestMeta) -> Result<usize, SuiteError> {
        let mut meta = meta;
        meta.name = meta.name.trim().to_string();
        if meta.name.is_empty() {
            return Err(SuiteError::InvalidTest("test name is empty".to_string()));
        }

        let mut state = self.state();
        if state.finalized {
            return Err(SuiteError::RegistrationClosed(self.name.clone()));
        }
        if state.tests.iter().any(|t| t.meta.name == meta.name) {
            return Err(SuiteError::InvalidTest(format!(
                "test '{}' is already declared in suite '{}'",
                meta.name, self.name
            )));
        }

        let id = state.tests.len();
        debug!("suite '{}': test '{}' added (#{id})", self.name, meta.name);
        let event = SuiteEvent::TestAdded {
            suite: self.name.clone(),
            meta: meta.clone(),
        };
        state.tests.push(TestUnit::new(id, meta));
        let _ = self.events.send(event);
        Ok(id)
    }

    pub fn find_test(&self, name: &str) -> Option<usize> {
        self.state().tests.iter().position(|t| t.meta.name == name)
    }

    pub fn test_meta(&self, id: usize) -> Option<TestMeta> {
        self.state().tests.get(id).map(|t| t.meta.clone())
    }

    pub fn declared_count(&self) -> usize {
        self.state().tests.len()
    }

    pub fn done_count(&self) -> usize {
        self.state().done
    }

    pub fn is_finalized(&self) -> bool {
        self.state().finalized
    }

    pub fn is_skip_all(&self) -> bool {
        self.state().skip_all
    }

    /// Toggle suite-wide skip; in-flight tests are unaffected
    pub fn set_skip(&self, skip: bool) {
        self.state().skip_all = skip;
    }

    /// Record the suite start time on the first dispatched test
    pub fn touch_start(&self) {
        let mut state = self.state();
        if state.started_at.is_none() {
            state.started_at = Some(Instant::now());
        }
    }

    /// Transition a queued test to running; false when the transition is
    /// no longer legal
    pub fn begin_test(&self, id: usize) -> bool {
        let mut state = self.state();
        match state.tests.get_mut(id) {
            Some(unit) if unit.status == TestStatus::Queued => {
                unit.status = TestStatus::Running;
                unit.started_at = Some(Instant::now());
                true
            }
            Some(unit) => {
                warn!(
                    "suite '{}': refusing to start test '{}' in state {}",
                    self.name, unit.meta.name, unit.status
                );
                false
            }
            None => false,
        }
    }

    /// Record a settled outcome, bump counters, emit the finish notification,
    /// and evaluate debounced completion
    pub fn finish_test(self: &Arc<Self>, id: usize, run: TestRun) {
        let arm_probe = {
            let mut state = self.state();
            let name = match state.tests.get(id) {
                Some(unit) => unit.meta.name.clone(),
                None => {
                    warn!("suite '{}': finish for unknown test #{id}", self.name);
                    return;
                }
            };

            let unit = &mut state.tests[id];
            if unit.status.is_terminal() {
                warn!(
                    "suite '{}': test '{}' already settled as {}, ignoring {}",
                    self.name, name, unit.status, run.status
                );
                return;
            }

            let run = if run.status.is_terminal() {
                run
            } else {
                TestRun::errored(
                    run.duration.unwrap_or(0.0),
                    TestFault::execution(format!(
                        "non-terminal status '{}' reported for test '{name}'",
                        run.status
                    )),
                )
            };

            let now = Instant::now();
            unit.status = run.status;
            unit.ended_at = Some(now);
            unit.duration = run.duration.or_else(|| {
                unit.started_at
                    .map(|s| (now - s).as_secs_f64() * 1000.0)
            });
            unit.fault = run.error.clone();

            match run.status {
                TestStatus::Passed => state.passed += 1,
                TestStatus::Failed => state.failed += 1,
                TestStatus::Errored => state.errored += 1,
                TestStatus::Skipped => state.skipped += 1,
                _ => {}
            }
            state.done += 1;
            debug!(
                "suite '{}': test '{}' finished as {} ({}/{})",
                self.name,
                name,
                run.status,
                state.done,
                state.tests.len()
            );

            let _ = self.events.send(SuiteEvent::TestFinished {
                suite: self.name.clone(),
                test: name,
                run,
            });

            if !state.finalized && state.done == state.tests.len() {
                Some(state.tests.len())
            } else {
                None
            }
        };

        if let Some(declared) = arm_probe {
            let suite = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(suite.probe_delay).await;
                suite.try_finalize(declared);
            });
        }
    }

    /// Completion probe: finalize only if nothing was registered or settled
    /// since the probe was armed
    fn try_finalize(self: &Arc<Self>, declared: usize) {
        let result = {
            let mut state = self.state();
            if state.finalized {
                return;
            }
            if state.tests.len() != declared || state.done != declared {
                debug!(
                    "suite '{}': completion probe revoked ({} declared, {} done)",
                    self.name,
                    state.tests.len(),
                    state.done
                );
                return;
            }

            state.finalized = true;
            let elapsed = state
                .started_at
                .map(|s| (Instant::now() - s).saturating_sub(self.probe_delay))
                .unwrap_or(Duration::ZERO);
            state.duration = Some(elapsed.as_secs_f64() * 1000.0);
            Self::snapshot_locked(self, &state)
        };

        info!(
            "suite '{}' finished: {} passed, {} failed, {} errored, {} skipped",
            self.name, result.passed, result.failed, result.errored, result.skipped
        );
        let _ = self.done_tx.send(true);
        let _ = self.events.send(SuiteEvent::Finished { result });
    }

    /// Resolves once the completion signal has fired
    pub async fn wait_done(&self) {
        let mut rx = self.done_rx.clone();
        loop {
            let done = *rx.borrow();
            if done {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Current aggregate; callable at any point of the suite's life
    pub fn snapshot(&self) -> SuiteResult {
        let state = self.state();
        Self::snapshot_locked(self, &state)
    }

    fn snapshot_locked(&self, state: &SuiteState) -> SuiteResult {
        let tests = state.tests.iter().map(TestUnit::to_result).collect();
        let mut result = SuiteResult::new(self.name.clone(), tests);
        if let Some(duration) = state.duration {
            result = result.with_duration(duration);
        }
        result
    }
}
