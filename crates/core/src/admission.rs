//! FIFO admission queue bounding concurrent calls
//!
//! A call holds its [`AdmissionSlot`] for its whole lifetime, retries
//! included. Dropping the slot frees it and admits the oldest waiter, so the
//! slot is released on every exit path: success, terminal error, exhausted
//! retries, panic unwind, or the caller abandoning the future.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

struct State {
    running: usize,
    waiting: VecDeque<oneshot::Sender<AdmissionSlot>>,
}

struct Shared {
    limit: usize,
    state: Mutex<State>,
}

impl Shared {
    /// Hand slots to the oldest waiters while capacity remains
    fn dispatch(shared: &Arc<Self>) {
        let mut state = shared.state.lock();

        while state.running < shared.limit {
            let Some(waiter) = state.waiting.pop_front() else {
                break;
            };

            state.running += 1;
            let slot = AdmissionSlot { shared: Some(Arc::clone(shared)) };

            if let Err(mut abandoned) = waiter.send(slot) {
                // Waiter went away before being admitted; the lock is held, so
                // release by hand instead of through Drop.
                abandoned.shared = None;
                state.running -= 1;
                continue;
            }

            trace!(running = state.running, queued = state.waiting.len(), "Admitted call");
        }
    }
}

/// Bounded, strictly FIFO admission of calls
#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("limit", &self.limit())
            .field("running", &self.running())
            .field("queued", &self.queued())
            .finish()
    }
}

impl AdmissionQueue {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(Shared {
                limit: limit.get(),
                state: Mutex::new(State { running: 0, waiting: VecDeque::new() }),
            }),
        }
    }

    /// Wait for a slot, in arrival order
    pub async fn acquire(&self) -> AdmissionSlot {
        loop {
            let (tx, rx) = oneshot::channel();
            self.shared.state.lock().waiting.push_back(tx);
            Shared::dispatch(&self.shared);

            if let Ok(slot) = rx.await {
                return slot;
            }
        }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Calls currently holding a slot
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Calls waiting for a slot
    pub fn queued(&self) -> usize {
        self.shared.state.lock().waiting.iter().filter(|tx| !tx.is_closed()).count()
    }
}

/// A granted concurrency slot, released on drop
#[must_use = "the slot is released as soon as it is dropped"]
pub struct AdmissionSlot {
    shared: Option<Arc<Shared>>,
}

impl std::fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot").field("armed", &self.shared.is_some()).finish()
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            {
                let mut state = shared.state.lock();
                state.running = state.running.saturating_sub(1);
            }
            Shared::dispatch(&shared);
        }
    }
}
