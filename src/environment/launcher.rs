//! Environment launching
//!
//! Brings an execution environment up and hands back a handle for feeding it
//! test resources and collecting what it reports. Interactive environments
//! spawn nothing; automated ones are backed by a browser session held at the
//! automation endpoint.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::models::{EnvMessage, SuiteResult};

use super::automation::{BrowserAutomation, BrowserSession};
use super::EnvironmentDescriptor;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("automation request failed: {0}")]
    RequestFailed(String),

    #[error("automation request timed out after {0} seconds")]
    Timeout(u64),

    #[error("automation endpoint refused connection at {0}")]
    ConnectionRefused(String),

    #[error("automation protocol error (status {status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("environment '{0}' has no browser to automate")]
    MissingBrowser(String),
}

enum Backing {
    Interactive,
    Automated {
        session: BrowserSession,
        automation: Arc<dyn BrowserAutomation>,
    },
}

/// A launched environment. The transport collaborator pushes inbound
/// messages through [`message_sender`](Self::message_sender); the session
/// driver consumes them via [`take_messages`](Self::take_messages) and
/// eventually fills the result slot.
pub struct EnvironmentHandle {
    descriptor: EnvironmentDescriptor,
    backing: Backing,
    instructions_tx: mpsc::UnboundedSender<String>,
    instructions_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    messages_tx: mpsc::UnboundedSender<EnvMessage>,
    messages_rx: Mutex<Option<mpsc::UnboundedReceiver<EnvMessage>>>,
    result_tx: Mutex<Option<oneshot::Sender<Vec<SuiteResult>>>>,
    result_rx: Mutex<Option<oneshot::Receiver<Vec<SuiteResult>>>>,
}

impl EnvironmentHandle {
    fn new(descriptor: EnvironmentDescriptor, backing: Backing) -> Self {
        let (instructions_tx, instructions_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        Self {
            descriptor,
            backing,
            instructions_tx,
            instructions_rx: Mutex::new(Some(instructions_rx)),
            messages_tx,
            messages_rx: Mutex::new(Some(messages_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
        }
    }

    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.backing, Backing::Interactive)
    }

    /// Queue a test resource reference for the environment to load
    pub fn inject(&self, resource: impl Into<String>) {
        let resource = resource.into();
        debug!("injecting '{}' into {}", resource, self.descriptor);
        if self.instructions_tx.send(resource).is_err() {
            warn!("environment {} no longer accepts instructions", self.descriptor);
        }
    }

    /// Instruction stream as seen from the environment side. Yields once.
    pub fn take_instructions(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.lock_instructions().take()
    }

    /// Sender the transport collaborator uses to push environment messages
    pub fn message_sender(&self) -> mpsc::UnboundedSender<EnvMessage> {
        self.messages_tx.clone()
    }

    /// Inbound message stream for the session driver. Yields once.
    pub fn take_messages(&self) -> Option<mpsc::UnboundedReceiver<EnvMessage>> {
        self.lock_messages().take()
    }

    /// Fill the per-environment result slot. Later calls are dropped.
    pub fn fulfill(&self, results: Vec<SuiteResult>) {
        let tx = self.lock_result_tx().take();
        match tx {
            Some(tx) => {
                if tx.send(results).is_err() {
                    debug!("nobody awaits results of {}", self.descriptor);
                }
            }
            None => debug!("result slot of {} already filled", self.descriptor),
        }
    }

    /// Wait for the session driver to fill the result slot. Yields once;
    /// `None` when the slot was already claimed or the driver went away.
    pub async fn await_result(&self) -> Option<Vec<SuiteResult>> {
        let rx = self.lock_result_rx().take()?;
        rx.await.ok()
    }

    /// Tear down the backing browser session. Failures are logged only.
    pub async fn dispose(&self) {
        match &self.backing {
            Backing::Interactive => {}
            Backing::Automated {
                session,
                automation,
            } => {
                if let Err(e) = automation.close(session).await {
                    warn!("failed to close session for {}: {e}", self.descriptor);
                }
            }
        }
    }

    fn lock_instructions(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedReceiver<String>>> {
        self.instructions_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedReceiver<EnvMessage>>> {
        self.messages_rx.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_result_tx(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<Vec<SuiteResult>>>> {
        self.result_tx.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_result_rx(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Receiver<Vec<SuiteResult>>>> {
        self.result_rx.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Launches environments described by descriptors
pub struct EnvironmentLauncher {
    automation: Arc<dyn BrowserAutomation>,
    entry_url: String,
}

impl EnvironmentLauncher {
    pub fn new(automation: Arc<dyn BrowserAutomation>, entry_url: impl Into<String>) -> Self {
        Self {
            automation,
            entry_url: entry_url.into(),
        }
    }

    /// Launch a single environment
    pub async fn launch(
        &self,
        descriptor: &EnvironmentDescriptor,
    ) -> Result<EnvironmentHandle, LaunchError> {
        if descriptor.interactive {
            debug!("using the already-open interactive surface");
            return Ok(EnvironmentHandle::new(
                descriptor.clone(),
                Backing::Interactive,
            ));
        }

        let kind = descriptor
            .browser
            .ok_or_else(|| LaunchError::MissingBrowser(descriptor.label()))?;
        let session = self.automation.open(kind).await?;
        if let Err(e) = self.automation.navigate(&session, &self.entry_url).await {
            // don't leak the browser session when navigation fails
            if let Err(close_err) = self.automation.close(&session).await {
                warn!("failed to close stillborn session: {close_err}");
            }
            return Err(e);
        }

        Ok(EnvironmentHandle::new(
            descriptor.clone(),
            Backing::Automated {
                session,
                automation: Arc::clone(&self.automation),
            },
        ))
    }

    /// Launch every descriptor, isolating failures: one environment failing
    /// to come up never stops its siblings.
    pub async fn launch_all(
        &self,
        descriptors: &[EnvironmentDescriptor],
    ) -> Vec<(EnvironmentDescriptor, Result<EnvironmentHandle, LaunchError>)> {
        let mut launched = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let outcome = self.launch(descriptor).await;
            if let Err(e) = &outcome {
                error!("environment {descriptor} failed to launch: {e}");
            }
            launched.push((descriptor.clone(), outcome));
        }
        launched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::BrowserKind;
    use crate::models::SuiteResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAutomation {
        opened: AtomicUsize,
        navigated: AtomicUsize,
        closed: AtomicUsize,
        fail_navigate: bool,
    }

    impl FakeAutomation {
        fn new() -> Self {
            Self {
                opened: AtomicUsize::new(0),
                navigated: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                fail_navigate: false,
            }
        }

        fn failing_navigation() -> Self {
            Self {
                fail_navigate: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl BrowserAutomation for FakeAutomation {
        async fn open(&self, _kind: BrowserKind) -> Result<BrowserSession, LaunchError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(BrowserSession {
                session_id: format!("fake-{n}"),
            })
        }

        async fn navigate(
            &self,
            _session: &BrowserSession,
            _url: &str,
        ) -> Result<(), LaunchError> {
            if self.fail_navigate {
                return Err(LaunchError::Protocol {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.navigated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self, _session: &BrowserSession) -> Result<(), LaunchError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn interactive_launch_spawns_nothing() {
        let automation = Arc::new(FakeAutomation::new());
        let launcher = EnvironmentLauncher::new(automation.clone(), "http://localhost:9000/run");

        let handle = launcher
            .launch(&EnvironmentDescriptor::interactive())
            .await
            .unwrap();
        assert!(handle.is_interactive());
        assert_eq!(automation.opened.load(Ordering::SeqCst), 0);

        handle.dispose().await;
        assert_eq!(automation.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn automated_launch_opens_and_navigates() {
        let automation = Arc::new(FakeAutomation::new());
        let launcher = EnvironmentLauncher::new(automation.clone(), "http://localhost:9000/run");

        let handle = launcher
            .launch(&EnvironmentDescriptor::browser(BrowserKind::Firefox))
            .await
            .unwrap();
        assert!(!handle.is_interactive());
        assert_eq!(automation.opened.load(Ordering::SeqCst), 1);
        assert_eq!(automation.navigated.load(Ordering::SeqCst), 1);

        handle.dispose().await;
        assert_eq!(automation.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_navigation_closes_the_session() {
        let automation = Arc::new(FakeAutomation::failing_navigation());
        let launcher = EnvironmentLauncher::new(automation.clone(), "http://localhost:9000/run");

        let err = launcher
            .launch(&EnvironmentDescriptor::browser(BrowserKind::Chromium))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Protocol { status: 500, .. }));
        assert_eq!(automation.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_all_isolates_failures() {
        let automation = Arc::new(FakeAutomation::failing_navigation());
        let launcher = EnvironmentLauncher::new(automation, "http://localhost:9000/run");

        let descriptors = vec![
            EnvironmentDescriptor::browser(BrowserKind::Chromium),
            EnvironmentDescriptor::interactive(),
        ];
        let launched = launcher.launch_all(&descriptors).await;
        assert_eq!(launched.len(), 2);
        assert!(launched[0].1.is_err());
        assert!(launched[1].1.is_ok());
    }

    #[tokio::test]
    async fn handle_channels_and_result_slot() {
        let handle = EnvironmentHandle::new(
            EnvironmentDescriptor::interactive(),
            Backing::Interactive,
        );

        handle.inject("suites/login.js");
        let mut instructions = handle.take_instructions().unwrap();
        assert_eq!(instructions.recv().await.unwrap(), "suites/login.js");
        assert!(handle.take_instructions().is_none());

        let results = vec![SuiteResult::new("login", vec![])];
        handle.fulfill(results.clone());
        let received = handle.await_result().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].name, "login");

        // slot yields once
        assert!(handle.await_result().await.is_none());
    }
}
