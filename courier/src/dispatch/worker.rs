/**
 * The background dispatch worker.
 *
 * Architecture overview:
 *
 * ```text
 *  ┌──────────────┐   mutex-guarded queue    ┌─────────────────┐
 *  │  Caller code  │ ── PendingRequest ─────► │  Worker thread   │
 *  │  (any thread) │        + wake signal     │  (single)        │
 *  └──────────────┘                          └───────┬─────────┘
 *                                          admission │ ▲ completions
 *                                                    ▼ │
 *                                            ┌─────────┴─────┐
 *                                            │ TransferEngine │
 *                                            └───────────────┘
 * ```
 *
 * One worker thread per client generation. It owns the engine and the
 * in-flight map outright; the only shared state is the queue/flags mutex
 * and the wake signal. Every iteration: admit up to the free slots, step
 * the engine, drain completions into callbacks, check the exit
 * conditions, then block on wake + engine readiness for a bounded wait.
 *
 * The thread exits on abort, on graceful drain, on idle timeout, or on an
 * engine failure; in every case it publishes `Stopped` while holding the
 * queue lock, after a final look at the queue, so a racing submit either
 * gets observed by this generation or sees `Stopped` and spawns the next.
 */
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Select;

use crate::client::Config;
use crate::engine::{EngineFactory, TransferId};
use crate::request::{CompletionFn, TransferResult, TransportError};

use super::queue::{Shared, WorkerState};

/// Upper bound on one blocking wait. Keeps the idle and drain conditions
/// re-evaluated even when neither the engine nor a caller produces events.
const FALLBACK_WAIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub(crate) struct Worker;

impl Worker {
    /**
     * Spawns one worker generation.
     *
     * The caller has already published `WorkerState::Running` under the
     * queue lock; this thread owns the transition to `Stopped`. The engine
     * is constructed on the new thread, so it never crosses threads.
     */
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        config: Config,
        factory: Arc<EngineFactory>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("courier-worker".into())
            .spawn(move || {
                /*
                 * Callbacks are individually contained below, so a panic
                 * escaping run() is a dispatcher bug. Still publish
                 * Stopped so the client can spawn a replacement instead of
                 * believing a dead thread is alive.
                 */
                let result = catch_unwind(AssertUnwindSafe(|| {
                    Self::run(&shared, &config, &*factory);
                }));

                if result.is_err() {
                    log::error!("dispatch worker panicked; marking worker stopped");
                    shared.lock_queue().worker = WorkerState::Stopped;
                    shared.active.store(0, Ordering::Relaxed);
                }
            })
    }

    /**
     * The run loop. Returns only when this generation is over; the exit
     * reason has already been logged and `Stopped` published.
     */
    fn run(shared: &Shared, config: &Config, factory: &EngineFactory) {
        let mut engine = match factory() {
            Ok(engine) => engine,
            Err(err) => {
                /*
                 * Fatal startup error: no engine means nothing queued can
                 * ever complete. Drop the queue without callbacks; callers
                 * detect this via has_live_worker/active_count.
                 */
                log::error!("transfer engine setup failed: {err}");
                let mut queue = shared.lock_queue();
                let dropped = queue.pending.len();
                queue.pending.clear();
                queue.worker = WorkerState::Stopped;
                drop(queue);
                if dropped > 0 {
                    log::warn!("dropped {dropped} queued request(s) after engine setup failure");
                }
                return;
            }
        };

        let mut in_flight: HashMap<TransferId, Option<CompletionFn>> = HashMap::new();
        let mut idle_since = Instant::now();
        let mut was_in_flight = false;

        loop {
            /*
             * 1. Admission: move queued requests into the engine, oldest
             *    first, up to the free slots. Zero slots leave the queue
             *    untouched. An aborting generation admits nothing.
             */
            let admitted = {
                let mut queue = shared.lock_queue();
                if queue.abort {
                    Vec::new()
                } else {
                    let slots = config.max_concurrent.saturating_sub(in_flight.len());
                    queue.take_admissible(slots)
                }
            };

            for request in admitted {
                match engine.add(request.id, request.spec) {
                    Ok(()) => {
                        in_flight.insert(request.id, request.callback);
                    }
                    Err(err) => {
                        /*
                         * Per-transfer registration failure. The request
                         * was accepted at submit time, so it still gets
                         * its one callback, through the error path.
                         */
                        log::warn!("engine refused transfer {}: {err}", request.id);
                        Self::dispatch_callback(
                            request.callback,
                            TransferResult::failure(TransportError(format!(
                                "could not register transfer: {err}"
                            ))),
                        );
                    }
                }
            }
            shared.active.store(in_flight.len(), Ordering::Relaxed);

            /* 2. One non-blocking progress step. */
            if let Err(err) = engine.step() {
                log::error!("engine poll failed: {err}; shutting down dispatch worker");
                let mut queue = shared.lock_queue();
                queue.worker = WorkerState::Stopped;
                drop(queue);
                shared.active.store(0, Ordering::Relaxed);
                return;
            }

            /*
             * 3. Drain completions. Look each handle up in the in-flight
             *    map, deliver its result, then unregister it everywhere.
             *    A completion for an untracked handle is a programming
             *    defect in the engine, not a caller-visible error.
             */
            let completed = engine.drain_completions();
            let freed_slots = !completed.is_empty();
            for completion in completed {
                match in_flight.remove(&completion.id) {
                    Some(callback) => {
                        Self::dispatch_callback(callback, completion.result);
                        if let Err(err) = engine.remove(completion.id) {
                            log::warn!("failed to unregister transfer {}: {err}", completion.id);
                        }
                    }
                    None => {
                        debug_assert!(
                            false,
                            "engine reported completion for untracked transfer {}",
                            completion.id
                        );
                        log::error!(
                            "engine reported completion for untracked transfer {}; ignoring",
                            completion.id
                        );
                    }
                }
            }
            shared.active.store(in_flight.len(), Ordering::Relaxed);

            /* Idleness starts when the in-flight set drains to empty. */
            let have_in_flight = !in_flight.is_empty();
            if was_in_flight && !have_in_flight {
                idle_since = Instant::now();
            }
            was_in_flight = have_in_flight;

            /*
             * 4. Exit checks, under the lock so the decision is atomic
             *    with the final queue observation. A request pushed after
             *    this point sees Stopped and spawns the next generation.
             */
            let (close_requested, queue_empty) = {
                let mut queue = shared.lock_queue();
                if queue.abort {
                    let abandoned = in_flight.len() + queue.pending.len();
                    queue.pending.clear();
                    queue.worker = WorkerState::Stopped;
                    drop(queue);
                    shared.active.store(0, Ordering::Relaxed);
                    if abandoned > 0 {
                        log::debug!("dispatch worker aborted; {abandoned} transfer(s) abandoned");
                    } else {
                        log::debug!("dispatch worker aborted");
                    }
                    /* Dropping the engine releases whatever is outstanding. */
                    return;
                }

                if in_flight.is_empty() && queue.pending.is_empty() {
                    /* Graceful close wins over idle timeout. */
                    if queue.close_when_finished {
                        queue.worker = WorkerState::Stopped;
                        drop(queue);
                        shared.active.store(0, Ordering::Relaxed);
                        log::debug!("dispatch worker drained; exiting");
                        return;
                    }
                    if idle_since.elapsed() >= config.idle_timeout {
                        queue.worker = WorkerState::Stopped;
                        drop(queue);
                        shared.active.store(0, Ordering::Relaxed);
                        log::debug!(
                            "dispatch worker idle for {:?}; exiting",
                            config.idle_timeout
                        );
                        return;
                    }
                }
                (queue.close_when_finished, queue.pending.is_empty())
            };

            /*
             * A completion just freed at least one slot. If work is still
             * queued, go straight back to admission instead of sleeping on
             * an event channel nothing will write to.
             */
            if freed_slots && !queue_empty {
                continue;
            }

            /*
             * 5. Bounded wait: the minimum of the engine's suggested poll
             *    interval, the remaining idle budget, and the fallback.
             */
            let readiness = engine.readiness();
            let mut wait = FALLBACK_WAIT;
            if let Some(next_poll) = readiness.next_poll {
                wait = wait.min(next_poll);
            }
            if in_flight.is_empty() && !close_requested {
                wait = wait.min(config.idle_timeout.saturating_sub(idle_since.elapsed()));
            }

            /*
             * 6. Block on the engine's readiness source plus the wake
             *    signal. Which one fired does not matter: the next
             *    iteration re-examines the queue and the engine anyway.
             */
            let mut select = Select::new();
            select.recv(shared.wake.receiver());
            if let Some(events) = readiness.events {
                select.recv(events);
            }
            let _ = select.ready_timeout(wait);

            /* 7. Collapse the wake so the next wait does not spin on it. */
            shared.wake.consume_and_test();
        }
    }

    /**
     * Invokes one completion callback, if present, containing any panic.
     * One failing callback must not take down the loop or starve the
     * completions drained after it.
     */
    fn dispatch_callback(callback: Option<CompletionFn>, result: TransferResult) {
        let Some(callback) = callback else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
            log::error!("completion callback panicked; continuing dispatch");
        }
    }
}
