/*!
 * Courier — fire-and-forget HTTP delivery with a lazily spawned
 * background dispatch worker.
 *
 * Callers on any thread build requests and submit them; a single worker
 * thread per [`Client`] admits them into a transfer engine under a
 * concurrency bound, polls for progress, and delivers each result to its
 * completion callback exactly once. The worker tears itself down after an
 * idle period and is transparently respawned by the next submission, so
 * an idle client costs nothing but memory.
 *
 * The network I/O itself lives behind the [`TransferEngine`] trait; the
 * default engine ([`AgentEngine`]) performs blocking exchanges with
 * `ureq`. Swap in your own engine with [`Client::with_engine`].
 *
 * # Module structure
 *
 * - `request/` — what we deliver: methods, specs, results, the builder
 * - `engine/` — how we deliver: the engine seam and the `ureq` engine
 * - `dispatch/` — who delivers: queue, wake signal, worker run loop
 * - `client` — lifecycle: submission, shutdown, introspection
 */

mod client;
mod dispatch;
mod engine;
mod request;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::{Client, Config, SubmitError};
pub use engine::{
    AgentEngine, Completion, EngineError, Readiness, TransferEngine, TransferId,
};
pub use request::{
    CompletionFn, Method, Request, RequestBuilder, TransferResult, TransferSpec, TransportError,
};
