//! Single-slot rendezvous between a blocked caller and the answer

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, Weak};

use requeststore::RequestId;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The request was answered with this text
    Answered(String),
    /// The caller's token fired first
    Cancelled,
    /// The manager dropped the slot without answering (primary shut down)
    Abandoned,
}

/// Correlation map: request id -> sending half of the waiting caller's slot
#[derive(Default)]
pub(crate) struct Correlations {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<String>>>,
    /// Set by `clear`; later registrations are abandoned immediately
    closed: AtomicBool,
}

impl Correlations {
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<String>>> {
        self.waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a slot; returns false (dropping `tx`) once cleared
    pub(crate) fn insert(&self, id: RequestId, tx: oneshot::Sender<String>) -> bool {
        let mut waiters = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        waiters.insert(id, tx);
        true
    }

    pub(crate) fn take(&self, id: RequestId) -> Option<oneshot::Sender<String>> {
        self.lock().remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop every slot, now and from later inserts; their callers observe `Abandoned`
    pub(crate) fn clear(&self) -> usize {
        let mut waiters = self.lock();
        self.closed.store(true, Ordering::Release);
        let count = waiters.len();
        waiters.clear();
        count
    }
}

/// The caller's end of a pending request
///
/// Dropping the handle without an answer evicts its correlation entry; the
/// stored record stays `pending` and can still be answered later.
pub struct WaitHandle {
    id: RequestId,
    rx: oneshot::Receiver<String>,
    registry: Weak<Correlations>,
}

impl WaitHandle {
    pub(crate) fn new(id: RequestId, rx: oneshot::Receiver<String>, registry: Weak<Correlations>) -> Self {
        Self { id, rx, registry }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Suspend until answered, abandoned, or `cancel` fires
    pub async fn wait(mut self, cancel: &CancellationToken) -> WaitOutcome {
        debug!(id = self.id, "WaitHandle::wait: called");
        let outcome = tokio::select! {
            biased;
            delivered = &mut self.rx => match delivered {
                Ok(text) => WaitOutcome::Answered(text),
                Err(_) => WaitOutcome::Abandoned,
            },
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };
        debug!(id = self.id, ?outcome, "WaitHandle::wait: finished");
        outcome
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade()
            && registry.take(self.id).is_some()
        {
            debug!(id = self.id, "WaitHandle::drop: evicted unanswered correlation");
        }
    }
}
