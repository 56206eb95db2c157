//! Supervised background tasks with a two-step shutdown.
//!
//! Every long-running unit of work in the transport (delivery workers,
//! their stream watchers, inbound dispatch loops) is registered here so
//! that shutdown can refuse new work, signal the running tasks, and wait
//! for them to finish.
//!
//! Shutdown moves through two phases. **Draining** refuses new tasks and
//! tells inbound sessions to answer their peers cleanly. **Stopping**
//! tells outbound workers to exit without sending anything further.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Running,
    Draining,
    Stopping,
}

struct Inner {
    phase: watch::Sender<Phase>,
    tasks: Mutex<JoinSet<()>>,
    runtime: Option<Handle>,
}

/// Owner of the transport's background tasks.
///
/// Cloning is cheap; all clones share the same tasks and phase.
///
/// Tasks run on the runtime the stopper was created in, so `run_task`
/// may be called from threads outside that runtime.
#[derive(Clone)]
pub struct Stopper {
    inner: Arc<Inner>,
}

impl Stopper {
    /// Create a stopper bound to the current runtime, if there is one.
    /// Without one, tasks run on whichever runtime calls `run_task`.
    pub fn new() -> Self {
        Self::build(Handle::try_current().ok())
    }

    /// Create a stopper whose tasks run on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self::build(Some(runtime))
    }

    fn build(runtime: Option<Handle>) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            inner: Arc::new(Inner {
                phase,
                tasks: Mutex::new(JoinSet::new()),
                runtime,
            }),
        }
    }

    /// Register and start a background task.
    ///
    /// Fails with `ShuttingDown` once draining has begun, and with
    /// `NoRuntime` when there is no runtime to spawn on. The phase check
    /// and the spawn happen under the same lock that `drain` takes, so no
    /// task can start after shutdown has been requested.
    pub fn run_task<F>(&self, name: &'static str, task: F) -> TransportResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = match &self.inner.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| TransportError::NoRuntime(name))?,
        };

        let mut tasks = self.inner.tasks.lock().expect("stopper tasks lock");
        if *self.inner.phase.borrow() != Phase::Running {
            debug!(task = name, "refusing task during shutdown");
            return Err(TransportError::ShuttingDown);
        }

        // Reap finished tasks so the set does not grow without bound.
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }

        tasks.spawn_on(task, &runtime);
        Ok(())
    }

    /// Whether shutdown has been requested.
    pub fn is_draining(&self) -> bool {
        *self.inner.phase.borrow() >= Phase::Draining
    }

    /// Resolves once draining has begun.
    pub async fn should_drain(&self) {
        self.wait_for(Phase::Draining).await
    }

    /// Resolves once stopping has begun.
    pub async fn should_stop(&self) {
        self.wait_for(Phase::Stopping).await
    }

    /// Refuse new tasks and signal inbound sessions to close.
    pub fn drain(&self) {
        let _tasks = self.inner.tasks.lock().expect("stopper tasks lock");
        let changed = self.inner.phase.send_if_modified(|phase| {
            if *phase < Phase::Draining {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        });
        if changed {
            info!("stopper draining");
        }
    }

    /// Drain, signal every task to stop, and wait for all of them.
    pub async fn stop(&self) {
        self.drain();
        self.inner.phase.send_replace(Phase::Stopping);

        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock().expect("stopper tasks lock"));
        let count = tasks.len();
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
        info!(tasks = count, "stopper stopped");
    }

    async fn wait_for(&self, phase: Phase) {
        let mut rx = self.inner.phase.subscribe();
        // The sender lives as long as `self`, so this only fails if it
        // was dropped, which also means shutdown.
        let _reached = rx.wait_for(|p| *p >= phase).await.is_ok();
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!(error = %e, "supervised task panicked");
        }
    }
}
