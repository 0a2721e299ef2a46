/**
 * The state shared between caller threads and the worker thread.
 *
 * Exactly one mutex guards exactly this: the FIFO pending queue, the
 * close/abort flags, and the worker-state cell used for the exit/spawn
 * handshake. The lock is held only for brief mutations, never across a
 * blocking wait or a callback. Everything else the worker owns privately;
 * the published in-flight count is a lock-free atomic snapshot.
 */
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::{Mutex, MutexGuard};

use crate::engine::TransferId;
use crate::request::{CompletionFn, TransferSpec};

use super::wake::WakeSignal;

// ---------------------------------------------------------------------------
// PendingRequest — the queued unit
// ---------------------------------------------------------------------------

/**
 * A submitted, not-yet-admitted transfer: its identity, the immutable
 * configuration the engine will receive, and the completion callback the
 * dispatcher keeps for itself.
 */
pub(crate) struct PendingRequest {
    pub(crate) id: TransferId,
    pub(crate) spec: TransferSpec,
    pub(crate) callback: Option<CompletionFn>,
}

// ---------------------------------------------------------------------------
// WorkerState
// ---------------------------------------------------------------------------

/**
 * Lifecycle of the (at most one) worker thread per client.
 *
 * Written under the queue lock. `Stopped` is published by the thread
 * itself as the last thing it does while holding the lock, which is what
 * lets a concurrent submit distinguish "push and wake" from "spawn a
 * fresh worker" without losing either the request or the wakeup.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    /// No thread has ever been spawned for this generation slot.
    NotRunning,
    Running,
    /// Graceful close requested; still admitting and completing.
    DrainPending,
    /// Abort requested; the loop exits at its next iteration.
    Aborting,
    /// The thread has exited (or is past its last queue check).
    Stopped,
}

impl WorkerState {
    /// A live worker will observe queue pushes and flag changes.
    pub(crate) fn is_live(self) -> bool {
        matches!(
            self,
            WorkerState::Running | WorkerState::DrainPending | WorkerState::Aborting
        )
    }
}

// ---------------------------------------------------------------------------
// QueueState / Shared
// ---------------------------------------------------------------------------

pub(crate) struct QueueState {
    pub(crate) pending: VecDeque<PendingRequest>,
    pub(crate) close_when_finished: bool,
    pub(crate) abort: bool,
    pub(crate) worker: WorkerState,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            close_when_finished: false,
            abort: false,
            worker: WorkerState::NotRunning,
        }
    }

    /**
     * One admission pass's worth of requests: up to `slots` entries from
     * the front, in submission order. With zero slots the queue is left
     * untouched.
     */
    pub(crate) fn take_admissible(&mut self, slots: usize) -> Vec<PendingRequest> {
        let count = slots.min(self.pending.len());
        self.pending.drain(..count).collect()
    }
}

/**
 * The caller↔worker surface: the guarded queue state, the wake signal,
 * and the published in-flight count. One per client, shared with every
 * worker generation through an `Arc`.
 */
pub(crate) struct Shared {
    queue: Mutex<QueueState>,
    pub(crate) wake: WakeSignal,
    pub(crate) active: AtomicUsize,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState::new()),
            wake: WakeSignal::new(),
            active: AtomicUsize::new(0),
        }
    }

    /**
     * Acquires the queue lock.
     *
     * A poisoned lock only means some thread panicked between two plain
     * data mutations; the state itself is still coherent, so recover the
     * guard instead of spreading the poison.
     */
    pub(crate) fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    fn pending(id: u64) -> PendingRequest {
        PendingRequest {
            id: TransferId::new(id),
            spec: TransferSpec::new(Method::Get, format!("http://localhost/{id}")),
            callback: None,
        }
    }

    /**
     * Admission takes a contiguous prefix in submission order and leaves
     * the remainder queued.
     */
    #[test]
    fn admission_is_a_fifo_prefix() {
        let mut queue = QueueState::new();
        for id in 1..=5 {
            queue.pending.push_back(pending(id));
        }

        let admitted = queue.take_admissible(3);
        let ids: Vec<u64> = admitted.iter().map(|p| p.id.as_u64()).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(queue.pending.len(), 2);
        assert_eq!(queue.pending[0].id.as_u64(), 4);
    }

    #[test]
    fn saturated_admission_leaves_queue_untouched() {
        let mut queue = QueueState::new();
        queue.pending.push_back(pending(1));

        assert!(queue.take_admissible(0).is_empty());
        assert_eq!(queue.pending.len(), 1);
    }

    #[test]
    fn admission_past_queue_length_drains_everything() {
        let mut queue = QueueState::new();
        queue.pending.push_back(pending(1));
        queue.pending.push_back(pending(2));

        assert_eq!(queue.take_admissible(10).len(), 2);
        assert!(queue.pending.is_empty());
    }

    #[test]
    fn liveness_by_state() {
        assert!(WorkerState::Running.is_live());
        assert!(WorkerState::DrainPending.is_live());
        assert!(WorkerState::Aborting.is_live());
        assert!(!WorkerState::NotRunning.is_live());
        assert!(!WorkerState::Stopped.is_live());
    }
}
