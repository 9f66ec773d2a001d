//! Ownership of a session's single background task.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Marker returned by a wait that was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

pub struct TaskSupervisor {
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    spawned: AtomicUsize,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handle: Mutex::new(None),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Spawn `task` unless one was already spawned. Returns whether it spawned.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handle = self.handle.lock();
        if self.spawned.load(Ordering::SeqCst) > 0 {
            return false;
        }
        self.spawned.fetch_add(1, Ordering::SeqCst);
        *handle = Some(tokio::spawn(task));
        true
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.shutdown.subscribe())
    }

    pub fn cancel(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait for the task to finish. No-op when nothing was spawned.
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Session task ended abnormally: {}", e);
            }
        }
    }
}

pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    pub async fn cancelled(&mut self) {
        // A dropped sender counts as cancellation too.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn sleep(&mut self, duration: std::time::Duration) -> Result<(), Cancelled> {
        self.sleep_until(tokio::time::Instant::now() + duration).await
    }

    pub async fn sleep_until(&mut self, deadline: tokio::time::Instant) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Ok(()),
            _ = self.cancelled() => Err(Cancelled),
        }
    }
}
