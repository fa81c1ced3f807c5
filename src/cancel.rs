//! Cooperative cancellation for asynchronous searches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::task::AbortHandle;

/// Shared flag polled by scan loops.
///
/// Clones observe the same state; once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct InFlight {
    token: CancellationToken,
    task: Option<AbortHandle>,
}

/// Holds the one asynchronous operation that may be outstanding.
///
/// Arming the slot cancels whatever it held before.
#[derive(Default)]
pub struct CancelSlot {
    current: Mutex<Option<InFlight>>,
}

impl CancelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the previous operation and returns the token for the next one.
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .lock()
            .replace(InFlight {
                token: token.clone(),
                task: None,
            });
        if let Some(previous) = previous {
            Self::stop(previous);
        }
        token
    }

    /// Attaches the delivering task to the operation owning `token`.
    ///
    /// If that operation was already replaced the task is aborted at once.
    pub fn attach(&self, token: &CancellationToken, task: AbortHandle) {
        let mut current = self.lock();
        match current.as_mut() {
            Some(in_flight) if Arc::ptr_eq(&in_flight.token.cancelled, &token.cancelled) => {
                in_flight.task = Some(task);
            }
            _ => task.abort(),
        }
    }

    /// Releases the slot if it still belongs to `token`.
    pub fn finish(&self, token: &CancellationToken) {
        let mut current = self.lock();
        if current
            .as_ref()
            .is_some_and(|in_flight| Arc::ptr_eq(&in_flight.token.cancelled, &token.cancelled))
        {
            *current = None;
        }
    }

    /// Cancels the outstanding operation, if any. Returns whether one existed.
    pub fn cancel(&self) -> bool {
        let previous = self.lock().take();
        match previous {
            Some(previous) => {
                Self::stop(previous);
                true
            }
            None => false,
        }
    }

    fn stop(in_flight: InFlight) {
        debug!("Cancelling in-flight search");
        in_flight.token.cancel();
        if let Some(task) = in_flight.task {
            task.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
