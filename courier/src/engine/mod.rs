/*!
 * The transfer-engine seam.
 *
 * The dispatcher never performs network I/O itself. It drives an opaque
 * engine through five operations: register a transfer, unregister it, make
 * one non-blocking progress step, describe what to wait on, and drain the
 * completed-transfer backlog. Everything else about connection handling,
 * TLS, redirects, and wire semantics belongs to the engine.
 *
 * The crate ships one production engine (`agent::AgentEngine`, blocking
 * HTTP on per-transfer threads) and tests script their own.
 */

use std::fmt;
use std::time::Duration;

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::request::{TransferResult, TransferSpec};

pub mod agent;

pub use agent::AgentEngine;

// ---------------------------------------------------------------------------
// TransferId
// ---------------------------------------------------------------------------

/**
 * Stable identity of one logical exchange.
 *
 * Allocated by the client at submission from a monotonic counter and used
 * as the key of the in-flight map and of every engine operation. A plain
 * integer rather than anything engine-specific, so identity never depends
 * on engine internals and ids stay valid across log lines.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/**
 * Failures raised by a transfer engine.
 *
 * `Setup` is fatal to a worker generation: the thread logs it, publishes
 * `Stopped`, and drops the queue without callbacks. The other variants are
 * per-operation and the dispatcher decides locally what to do with them.
 */
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine setup failed: {0}")]
    Setup(String),

    #[error("transfer {0} is not registered with the engine")]
    UnknownTransfer(TransferId),

    #[error("engine failure: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Completion / Readiness
// ---------------------------------------------------------------------------

/// One finished transfer, drained from the engine's backlog.
#[derive(Debug)]
pub struct Completion {
    pub id: TransferId,
    pub result: TransferResult,
}

/**
 * What the worker should wait on before its next iteration.
 *
 * The channel-based rendition of "readiness descriptors": an optional
 * completion-event receiver the worker registers in its multiplexed wait
 * alongside the wake signal, plus an optional suggested poll interval for
 * engines that make progress only when stepped. Engines may return either,
 * both, or neither; with neither, the worker falls back to a bounded
 * periodic wait.
 */
pub struct Readiness<'a> {
    /// Becomes ready when the engine has completions to drain.
    pub events: Option<&'a Receiver<Completion>>,

    /// Engine's suggested maximum wait before the next `step()`.
    pub next_poll: Option<Duration>,
}

// ---------------------------------------------------------------------------
// TransferEngine
// ---------------------------------------------------------------------------

/**
 * The dispatcher's view of a multiplexed transfer library.
 *
 * One engine instance serves one worker generation and lives entirely on
 * the worker thread; implementations never need to be `Sync`. Dropping the
 * engine releases whatever transfers are still outstanding, which is how
 * an aborting worker abandons in-flight work.
 */
pub trait TransferEngine {
    /**
     * Registers a transfer and starts making progress on it. At most one
     * `add` per id. A per-transfer failure here is reported to that
     * transfer's callback by the dispatcher; it does not stop the loop.
     */
    fn add(&mut self, id: TransferId, spec: TransferSpec) -> Result<(), EngineError>;

    /**
     * Unregisters a transfer. Called after its completion was drained, or
     * to abandon a transfer early; a late completion for an abandoned id
     * must be discarded by the engine.
     */
    fn remove(&mut self, id: TransferId) -> Result<(), EngineError>;

    /// One non-blocking progress increment. Returns the number of
    /// transfers still outstanding.
    fn step(&mut self) -> Result<usize, EngineError>;

    /// What the worker should block on until the next iteration.
    fn readiness(&self) -> Readiness<'_>;

    /// Empties the engine's completed-transfer backlog. Non-blocking.
    fn drain_completions(&mut self) -> Vec<Completion>;
}

/**
 * Builds a fresh engine for each worker generation.
 *
 * Invoked on the newly spawned worker thread, so the engine itself never
 * crosses threads; only the factory must be `Send + Sync`.
 */
pub(crate) type EngineFactory =
    dyn Fn() -> Result<Box<dyn TransferEngine>, EngineError> + Send + Sync;
