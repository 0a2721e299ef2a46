/**
 * Dispatch layer: the queue shared with callers, the cross-thread wake
 * signal, and the background worker that drives the transfer engine.
 *
 * - `wake` — collapse-on-raise wake primitive for the blocking wait
 * - `queue` — pending queue, shutdown flags, worker-state handshake
 * - `worker` — the run loop: admission, polling, completion dispatch
 */

pub(crate) mod queue;
pub(crate) mod wake;
pub(crate) mod worker;

pub(crate) use queue::{PendingRequest, Shared, WorkerState};
pub(crate) use worker::Worker;
