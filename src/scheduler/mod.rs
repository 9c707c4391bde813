//! Test dispatch policy
//!
//! Concurrent tests launch immediately and race their own ttl; synchronous
//! tests of one suite form a single FIFO tail. Executor faults are contained
//! and recorded as the test's outcome, never propagated.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;

use crate::models::{TestFault, TestMeta, TestMode, TestRun};
use crate::suite::{Suite, SuiteError};

pub type TestBody = Pin<Box<dyn Future<Output = Result<(), TestFault>> + Send>>;
pub type TestExecutor = Box<dyn FnOnce() -> TestBody + Send>;

/// Where a test's settlement comes from
pub enum Execution {
    /// A boxed executor run in-process
    Local(TestExecutor),
    /// The run reported by a driven environment via TEST_ENDED
    Reported(oneshot::Receiver<TestRun>),
}

/// Wrap an async closure as a local execution
pub fn executor<F, Fut>(f: F) -> Execution
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TestFault>> + Send + 'static,
{
    Execution::Local(Box::new(move || Box::pin(f())))
}

/// A declared test paired with its execution source
pub struct TestSpec {
    pub meta: TestMeta,
    pub execution: Execution,
}

impl TestSpec {
    pub fn new(meta: TestMeta, execution: Execution) -> Self {
        Self { meta, execution }
    }
}

/// Per-suite dispatcher
pub struct ExecutionCoordinator {
    suite: Arc<Suite>,
    sync_tail: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ExecutionCoordinator {
    pub fn new(suite: Arc<Suite>) -> Self {
        Self {
            suite,
            sync_tail: Mutex::new(None),
        }
    }

    pub fn suite(&self) -> &Arc<Suite> {
        &self.suite
    }

    /// Register and dispatch a full declaration set
    pub fn execute(&self, specs: Vec<TestSpec>) -> Result<(), SuiteError> {
        if specs.is_empty() {
            return Err(SuiteError::Empty(self.suite.name().to_string()));
        }
        for spec in specs {
            let id = self.suite.add_test(spec.meta)?;
            self.dispatch(id, spec.execution);
        }
        Ok(())
    }

    /// Dispatch one registered test according to its mode
    pub fn dispatch(&self, id: usize, execution: Execution) {
        let suite = Arc::clone(&self.suite);
        let meta = match suite.test_meta(id) {
            Some(meta) => meta,
            None => {
                warn!("dispatch for unknown test #{id} in suite '{}'", suite.name());
                return;
            }
        };

        if suite.is_skip_all() {
            suite.finish_test(id, TestRun::skipped());
            return;
        }

        suite.touch_start();

        if meta.skip {
            suite.finish_test(id, TestRun::skipped());
            return;
        }

        let ttl = meta.effective_ttl(suite.default_ttl());

        match meta.mode {
            TestMode::Concurrent => {
                tokio::spawn(Self::run_one(suite, id, execution, ttl, None, None));
            }
            TestMode::Synchronous => {
                let (settled_tx, settled_rx) = oneshot::channel();
                let predecessor = {
                    let mut tail = self.sync_tail.lock().unwrap_or_else(|e| e.into_inner());
                    tail.replace(settled_rx)
                };
                tokio::spawn(Self::run_one(
                    suite,
                    id,
                    execution,
                    ttl,
                    predecessor,
                    Some(settled_tx),
                ));
            }
        }
    }

    async fn run_one(
        suite: Arc<Suite>,
        id: usize,
        execution: Execution,
        ttl: Option<Duration>,
        predecessor: Option<oneshot::Receiver<()>>,
        settled: Option<oneshot::Sender<()>>,
    ) {
        if let Some(prev) = predecessor {
            // a dropped sender still unblocks the chain
            let _ = prev.await;
        }

        if suite.begin_test(id) {
            let started = Instant::now();
            let run = match execution {
                Execution::Local(body) => Self::run_local(body, ttl, started).await,
                Execution::Reported(rx) => Self::run_reported(rx, ttl, started).await,
            };
            suite.finish_test(id, run);
        }

        if let Some(tx) = settled {
            let _ = tx.send(());
        }
    }

    async fn run_local(body: TestExecutor, ttl: Option<Duration>, started: Instant) -> TestRun {
        let task = tokio::spawn(body());
        let joined = match ttl {
            Some(budget) => match tokio::time::timeout(budget, task).await {
                Ok(joined) => joined,
                // the executor task keeps running detached; it is just no
                // longer awaited
                Err(_) => return TestRun::failed(elapsed_ms(started), TestFault::timeout(budget)),
            },
            None => task.await,
        };

        let duration = elapsed_ms(started);
        match joined {
            Ok(Ok(())) => TestRun::passed(duration),
            Ok(Err(fault)) if fault.is_assertion() => TestRun::failed(duration, fault),
            Ok(Err(fault)) => TestRun::errored(duration, fault),
            Err(join_error) => {
                TestRun::errored(duration, TestFault::execution(panic_message(join_error)))
            }
        }
    }

    async fn run_reported(
        rx: oneshot::Receiver<TestRun>,
        ttl: Option<Duration>,
        started: Instant,
    ) -> TestRun {
        let received = match ttl {
            Some(budget) => match tokio::time::timeout(budget, rx).await {
                Ok(received) => received,
                Err(_) => return TestRun::failed(elapsed_ms(started), TestFault::timeout(budget)),
            },
            None => rx.await,
        };

        match received {
            Ok(mut run) => {
                if run.duration.is_none() {
                    run.duration = Some(elapsed_ms(started));
                }
                run
            }
            Err(_) => TestRun::errored(
                elapsed_ms(started),
                TestFault::execution("environment disconnected before the test settled"),
            ),
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    (Instant::now() - started).as_secs_f64() * 1000.0
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        let payload = error.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test executor panicked".to_string()
        }
    } else {
        "test executor was cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TestMeta, TestStatus};
    use crate::suite::{SuiteEvent, SuiteOptions};
    use std::sync::Mutex as StdMutex;

    fn coordinator(name: &str) -> ExecutionCoordinator {
        ExecutionCoordinator::new(Suite::new(name))
    }

    #[tokio::test(start_paused = true)]
    async fn three_concurrent_tests_two_pass_one_throws() {
        let coordinator = coordinator("math");
        let suite = Arc::clone(coordinator.suite());
        let mut events = suite.subscribe();

        coordinator
            .execute(vec![
                TestSpec::new(
                    TestMeta::new("adds"),
                    executor(|| async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(())
                    }),
                ),
                TestSpec::new(
                    TestMeta::new("subtracts"),
                    executor(|| async {
                        tokio::time::sleep(Duration::from_millis(3)).await;
                        Ok(())
                    }),
                ),
                TestSpec::new(
                    TestMeta::new("divides"),
                    executor(|| async {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        panic!("division by zero")
                    }),
                ),
            ])
            .unwrap();

        suite.wait_done().await;
        let result = suite.snapshot();
        assert_eq!(result.passed, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(result.errored, 1);
        assert_eq!(result.skipped, 0);
        assert!(result.duration.unwrap() > 0.0);

        let mut finished_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SuiteEvent::Finished { .. }) {
                finished_events += 1;
            }
        }
        assert_eq!(finished_events, 1);

        let errored = result.tests.iter().find(|t| t.name == "divides").unwrap();
        assert_eq!(errored.status, TestStatus::Errored);
        assert!(errored
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("division by zero"));
    }

    #[tokio::test(start_paused = true)]
    async fn synchronous_chain_settles_in_declaration_order() {
        let coordinator = coordinator("ordered");
        let suite = Arc::clone(coordinator.suite());
        let starts: Arc<StdMutex<Vec<(String, Instant)>>> = Arc::new(StdMutex::new(Vec::new()));

        let log_one = Arc::clone(&starts);
        let log_two = Arc::clone(&starts);
        coordinator
            .execute(vec![
                TestSpec::new(
                    TestMeta::new("one").synchronous().with_ttl(50),
                    executor(move || async move {
                        log_one.lock().unwrap().push(("one".to_string(), Instant::now()));
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(())
                    }),
                ),
                TestSpec::new(
                    TestMeta::new("two").synchronous(),
                    executor(move || async move {
                        log_two.lock().unwrap().push(("two".to_string(), Instant::now()));
                        Ok(())
                    }),
                ),
            ])
            .unwrap();

        suite.wait_done().await;
        let result = suite.snapshot();

        let one = result.tests.iter().find(|t| t.name == "one").unwrap();
        assert_eq!(one.status, TestStatus::Failed);
        assert_eq!(one.error.as_ref().unwrap().kind, TestFault::TIMEOUT);

        let two = result.tests.iter().find(|t| t.name == "two").unwrap();
        assert_eq!(two.status, TestStatus::Passed);

        let starts = starts.lock().unwrap();
        assert_eq!(starts[0].0, "one");
        assert_eq!(starts[1].0, "two");
        // test two may only start once test one's budget elapsed
        assert!(starts[1].1 - starts[0].1 >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_test_consumes_no_budget() {
        let coordinator = coordinator("skippy");
        let suite = Arc::clone(coordinator.suite());

        coordinator
            .execute(vec![TestSpec::new(
                TestMeta::new("ignored").with_skip(true).with_ttl(1),
                executor(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }),
            )])
            .unwrap();

        suite.wait_done().await;
        let result = suite.snapshot();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.done, 1);
        assert_eq!(result.tests[0].duration, None);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_run_skip_is_not_retroactive() {
        let coordinator = coordinator("partial");
        let suite = Arc::clone(coordinator.suite());

        let id = suite.add_test(TestMeta::new("in flight")).unwrap();
        coordinator.dispatch(
            id,
            executor(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }),
        );

        suite.set_skip(true);
        let late = suite.add_test(TestMeta::new("not yet dispatched")).unwrap();
        coordinator.dispatch(late, executor(|| async { Ok(()) }));

        suite.wait_done().await;
        let result = suite.snapshot();
        let in_flight = result.tests.iter().find(|t| t.name == "in flight").unwrap();
        assert_eq!(in_flight.status, TestStatus::Passed);
        let skipped = result
            .tests
            .iter()
            .find(|t| t.name == "not yet dispatched")
            .unwrap();
        assert_eq!(skipped.status, TestStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn long_running_test_opts_out_of_ttl() {
        let suite = Suite::with_options(
            "patient",
            SuiteOptions {
                default_ttl: Some(Duration::from_millis(10)),
                ..SuiteOptions::default()
            },
        );
        let coordinator = ExecutionCoordinator::new(Arc::clone(&suite));

        coordinator
            .execute(vec![TestSpec::new(
                TestMeta::new("marathon").long_running(),
                executor(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                }),
            )])
            .unwrap();

        suite.wait_done().await;
        assert_eq!(suite.snapshot().passed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reported_settlement_is_recorded_as_sent() {
        let coordinator = coordinator("driven");
        let suite = Arc::clone(coordinator.suite());

        let (tx, rx) = oneshot::channel();
        let id = suite.add_test(TestMeta::new("remote")).unwrap();
        coordinator.dispatch(id, Execution::Reported(rx));

        tx.send(TestRun::failed(42.0, TestFault::assertion("expected true")))
            .unwrap();

        suite.wait_done().await;
        let result = suite.snapshot();
        let remote = &result.tests[0];
        assert_eq!(remote.status, TestStatus::Failed);
        assert_eq!(remote.duration, Some(42.0));
        assert!(remote.error.as_ref().unwrap().is_assertion());
    }

    #[tokio::test]
    async fn empty_plan_is_an_error() {
        let coordinator = coordinator("void");
        assert!(matches!(
            coordinator.execute(vec![]),
            Err(SuiteError::Empty(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn assertion_faults_fail_instead_of_erroring() {
        let coordinator = coordinator("verdicts");
        let suite = Arc::clone(coordinator.suite());

        coordinator
            .execute(vec![
                TestSpec::new(
                    TestMeta::new("asserts"),
                    executor(|| async { Err(TestFault::assertion("expected 3, got 4")) }),
                ),
                TestSpec::new(
                    TestMeta::new("faults"),
                    executor(|| async { Err(TestFault::execution("io unavailable")) }),
                ),
            ])
            .unwrap();

        suite.wait_done().await;
        let result = suite.snapshot();
        assert_eq!(result.failed, 1);
        assert_eq!(result.errored, 1);
    }
}
