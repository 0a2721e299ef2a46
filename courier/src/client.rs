/**
 * The public entry point.
 *
 * A `Client` owns at most one live worker at a time, held as a swappable
 * `Mutex<Option<JoinHandle>>` slot. Submission is fire and forget: push
 * onto the shared queue, raise the wake signal, and lazily spawn a worker
 * if none is alive. The worker tears itself down when idle, so a client
 * that goes quiet holds no thread and no engine; the next submit
 * transparently restarts both.
 *
 * Lifecycle:
 * 1. `Client::new()` creates the shared state; no thread yet.
 * 2. `submit` / builder `.submit()` enqueue requests; the first one
 *    spawns the worker.
 * 3. `close_when_finished()` + `join()` drain and wait; `abort()`
 *    abandons everything at the next loop iteration.
 * 4. Dropping the client implies `abort()` without joining.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::{PendingRequest, Shared, Worker, WorkerState};
use crate::engine::{AgentEngine, EngineError, EngineFactory, TransferEngine, TransferId};
use crate::request::{Method, Request, RequestBuilder};

// ---------------------------------------------------------------------------
// Tuning defaults
// ---------------------------------------------------------------------------

/// Default bound on simultaneously in-flight transfers.
const DEFAULT_MAX_CONCURRENT: usize = 32;

/// Default time a fully idle worker waits before releasing its thread and
/// engine (and with them any cached connections).
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine defaults: 10 s to connect, 30 s per request overall.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/**
 * Construction-time tuning for a client.
 *
 * `max_concurrent` must be positive; zero is normalized to one with a
 * warning rather than wedging the dispatcher.
 */
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on the in-flight set. Queued requests wait for a free slot.
    pub max_concurrent: usize,

    /// How long a worker with nothing in flight and nothing queued stays
    /// alive before exiting.
    pub idle_timeout: Duration,

    /// Connect timeout for the default engine.
    pub connect_timeout: Duration,

    /// Overall per-request timeout for the default engine, unless the
    /// request overrides it.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    fn normalized(mut self) -> Self {
        if self.max_concurrent == 0 {
            log::warn!("max_concurrent = 0 is not meaningful; using 1");
            self.max_concurrent = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SubmitError
// ---------------------------------------------------------------------------

/**
 * Synchronous submission failures.
 *
 * Everything that can go wrong after submission travels through the
 * completion callback instead; `submit` itself only rejects requests that
 * could never be dispatched.
 */
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request has no target URL")]
    MissingTarget,

    #[error("request builder is not bound to a client; build() it and call Client::submit")]
    Detached,

    #[error("failed to spawn the dispatch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/**
 * Asynchronous HTTP delivery client.
 *
 * Cheap to keep around while idle: the background worker and its engine
 * exist only between the first submit and the next idle timeout or
 * shutdown. All completion callbacks run on the worker thread, one at a
 * time, concurrently with caller threads but never with each other.
 *
 * # Example
 * ```no_run
 * let client = courier::Client::new();
 * client
 *     .get("https://example.com")
 *     .on_complete(|result| {
 *         println!("status: {:?}, {} bytes", result.status, result.body.len());
 *     })
 *     .submit()
 *     .unwrap();
 * client.close_when_finished();
 * client.join();
 * ```
 */
pub struct Client {
    shared: Arc<Shared>,
    config: Config,
    factory: Arc<EngineFactory>,
    next_id: AtomicU64,

    /// The swappable worker slot. Holds the join handle of the current
    /// generation; reaped lazily once that generation has stopped.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// A client with default tuning and the `ureq`-backed engine.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A client with custom tuning and the `ureq`-backed engine.
    pub fn with_config(config: Config) -> Self {
        let connect_timeout = config.connect_timeout;
        let request_timeout = config.request_timeout;
        Self::with_engine(config, move || {
            let engine: Box<dyn TransferEngine> =
                Box::new(AgentEngine::new(connect_timeout, request_timeout));
            Ok(engine)
        })
    }

    /**
     * A client driving a custom transfer engine.
     *
     * The factory runs on each freshly spawned worker thread, once per
     * worker generation; an idle-restarted worker gets a brand-new engine.
     * A factory error is fatal to that generation (see the crate's error
     * handling notes), not to the client.
     */
    pub fn with_engine<F>(config: Config, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TransferEngine>, EngineError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared::new()),
            config: config.normalized(),
            factory: Arc::new(factory),
            next_id: AtomicU64::new(1),
            worker: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Request construction
    // -----------------------------------------------------------------------

    /// Starts a request with an explicit method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::bound(self, method, url)
    }

    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Get, url)
    }

    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Head, url)
    }

    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Post, url)
    }

    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Put, url)
    }

    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Delete, url)
    }

    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Patch, url)
    }

    pub fn options(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::Options, url)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /**
     * Queues a built request for delivery. Fire and forget: on `Ok` the
     * call has already returned control and the outcome will arrive via
     * the request's completion callback on the worker thread.
     *
     * Takes the request by value; a submitted request cannot be touched,
     * let alone resubmitted. The only synchronous rejections are a missing
     * target URL and a failed worker-thread spawn.
     */
    pub fn submit(&self, request: Request) -> Result<(), SubmitError> {
        if request.spec.url.trim().is_empty() {
            return Err(SubmitError::MissingTarget);
        }

        let id = TransferId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let pending = PendingRequest {
            id,
            spec: request.spec,
            callback: request.callback,
        };

        /*
         * Push and read the worker state under the same lock the worker
         * uses for its exit decision: either this push lands before the
         * worker's final queue check (and cancels the exit), or the state
         * read here already says Stopped and we spawn a fresh generation.
         */
        let state = {
            let mut queue = self.shared.lock_queue();
            queue.pending.push_back(pending);
            queue.worker
        };

        if state.is_live() {
            self.shared.wake.raise();
            return Ok(());
        }
        self.ensure_worker()
    }

    /**
     * Spawns a worker generation if none is live.
     *
     * Serialized by the slot lock so concurrent submits cannot spawn two
     * threads. The previous generation's handle is reaped here; it has
     * already published `Stopped`, so the join returns immediately.
     */
    fn ensure_worker(&self) -> Result<(), SubmitError> {
        let mut slot = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        {
            let mut queue = self.shared.lock_queue();
            if queue.worker.is_live() {
                /* Someone else spawned while we waited for the slot. */
                drop(queue);
                self.shared.wake.raise();
                return Ok(());
            }
            /* Fresh generation: shutdown requests died with the old one. */
            queue.abort = false;
            queue.close_when_finished = false;
            queue.worker = WorkerState::Running;
        }

        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                log::error!("previous dispatch worker terminated by panic");
            }
        }

        match Worker::spawn(self.shared.clone(), self.config.clone(), self.factory.clone()) {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.lock_queue().worker = WorkerState::NotRunning;
                Err(SubmitError::WorkerSpawn(err))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown & introspection
    // -----------------------------------------------------------------------

    /**
     * Requests a graceful drain: everything already queued or in flight
     * (and anything submitted while draining) still completes; the worker
     * exits once nothing remains. Idempotent, non-blocking; pair with
     * [`join`](Self::join) to wait for the drain.
     */
    pub fn close_when_finished(&self) {
        {
            let mut queue = self.shared.lock_queue();
            queue.close_when_finished = true;
            if queue.worker == WorkerState::Running {
                queue.worker = WorkerState::DrainPending;
            }
        }
        self.shared.wake.raise();
    }

    /**
     * Requests an immediate abandon: the worker exits at its next loop
     * iteration; queued and in-flight transfers get no callback, and the
     * engine releases outstanding work when dropped. Idempotent.
     */
    pub fn abort(&self) {
        {
            let mut queue = self.shared.lock_queue();
            queue.abort = true;
            if queue.worker.is_live() {
                queue.worker = WorkerState::Aborting;
            }
        }
        self.shared.wake.raise();
    }

    /**
     * Blocks until the current worker (if any) has stopped. Returns
     * immediately when no worker exists. Typically preceded by
     * [`close_when_finished`](Self::close_when_finished) or
     * [`abort`](Self::abort); joining a busy worker with neither
     * requested waits for its idle timeout.
     */
    pub fn join(&self) {
        let handle = {
            let mut slot = match self.worker.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("dispatch worker terminated by panic");
            }
        }
    }

    /**
     * Snapshot of how many transfers are currently in flight. May be
     * stale by the time it is read; useful for admission-aware callers
     * and diagnostics, not for synchronization.
     */
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Whether a worker thread currently exists for this client.
    pub fn has_live_worker(&self) -> bool {
        self.shared.lock_queue().worker.is_live()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    /**
     * Implicit abort, deliberately without a join: destruction must not
     * block on network I/O. The orphaned worker observes the flag at its
     * next iteration and exits. Callers who need their callbacks to run
     * must keep the client alive until they have fired.
     */
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_concurrency_is_normalized() {
        let config = Config {
            max_concurrent: 0,
            ..Config::default()
        }
        .normalized();
        assert_eq!(config.max_concurrent, 1);
    }

    #[test]
    fn missing_target_is_rejected() {
        let client = Client::new();
        let request = RequestBuilder::new(Method::Get, "").build();
        assert!(matches!(
            client.submit(request),
            Err(SubmitError::MissingTarget)
        ));
        assert!(!client.has_live_worker());
    }

    #[test]
    fn idle_client_reports_no_worker_and_zero_active() {
        let client = Client::new();
        assert!(!client.has_live_worker());
        assert_eq!(client.active_count(), 0);
        /* join with no worker returns immediately */
        client.join();
    }
}
