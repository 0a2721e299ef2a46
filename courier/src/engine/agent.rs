/*!
 * The production transfer engine, backed by `ureq`.
 *
 * `ureq` is a pure-Rust blocking HTTP client with no async runtime, which
 * keeps the dependency tree small. Blocking I/O and a multiplexed engine
 * contract meet in the middle here: each admitted transfer runs on its own
 * short-lived thread, and completions funnel into a channel that doubles
 * as the engine's readiness source. The dispatcher's admission bound keeps
 * the thread count at or below `max_concurrent`, so the engine never
 * manages a pool of its own.
 *
 * Cancellation is cooperative. Dropping the engine (the abort path)
 * detaches any outstanding transfer threads; their completions land in a
 * disconnected channel and vanish, and the threads exit after their
 * current exchange finishes or times out.
 */

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use ureq::Agent;

use crate::engine::{Completion, EngineError, Readiness, TransferEngine, TransferId};
use crate::request::{TransferResult, TransferSpec, TransportError};

// ---------------------------------------------------------------------------
// AgentEngine
// ---------------------------------------------------------------------------

/**
 * `TransferEngine` implementation over a shared `ureq::Agent`.
 *
 * The agent holds the connection pool and the default timeouts; transfers
 * with a per-request timeout override get a one-off agent built from the
 * same template. Non-2xx statuses are results, not errors.
 */
pub struct AgentEngine {
    agent: Agent,

    /// Timeout template for one-off agents serving override requests.
    connect_timeout: Duration,

    /// Cloned into every transfer thread.
    tx: Sender<Completion>,
    rx: Receiver<Completion>,

    /// Ids added and not yet drained.
    outstanding: HashSet<TransferId>,

    /// Ids removed before their completion arrived; late completions for
    /// these are discarded on drain.
    abandoned: HashSet<TransferId>,
}

impl AgentEngine {
    /**
     * Creates an engine with the given connect and overall timeouts.
     *
     * Connection pooling and keep-alive are handled by the agent
     * internally, which is why one engine instance per worker generation
     * is worth keeping alive across many transfers.
     */
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self {
            agent: Self::build_agent(connect_timeout, request_timeout),
            connect_timeout,
            tx,
            rx,
            outstanding: HashSet::new(),
            abandoned: HashSet::new(),
        }
    }

    fn build_agent(connect_timeout: Duration, request_timeout: Duration) -> Agent {
        Agent::config_builder()
            .timeout_connect(Some(connect_timeout))
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .into()
    }

    /**
     * Performs one blocking exchange. Runs on the transfer's own thread.
     *
     * Every failure path collapses into a `TransferResult::failure`; this
     * function never panics and never returns early without a result,
     * because the dispatcher's "exactly one callback" promise rides on it.
     */
    fn perform(agent: &Agent, spec: &TransferSpec) -> TransferResult {
        let mut builder = ureq::http::Request::builder()
            .method(spec.method.as_str())
            .uri(spec.url.as_str());
        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request = match builder.body(spec.body.clone().unwrap_or_default()) {
            Ok(request) => request,
            Err(err) => {
                return TransferResult::failure(TransportError(format!(
                    "invalid request: {err}"
                )))
            }
        };

        match agent.run(request) {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.into_body().read_to_vec() {
                    Ok(body) => TransferResult::success(status, body),
                    Err(err) => TransferResult::failure(TransportError(format!(
                        "failed to read response body: {err}"
                    ))),
                }
            }
            Err(err) => TransferResult::failure(TransportError(err.to_string())),
        }
    }
}

impl TransferEngine for AgentEngine {
    fn add(&mut self, id: TransferId, spec: TransferSpec) -> Result<(), EngineError> {
        if self.outstanding.contains(&id) {
            return Err(EngineError::Internal(format!(
                "transfer {id} is already registered"
            )));
        }

        let agent = match spec.timeout {
            Some(timeout) => Self::build_agent(self.connect_timeout, timeout),
            None => self.agent.clone(),
        };
        let tx = self.tx.clone();

        thread::Builder::new()
            .name(format!("courier-transfer-{}", id.as_u64()))
            .spawn(move || {
                let result = Self::perform(&agent, &spec);
                /* The engine may already be gone (abort path); a send into
                 * a disconnected channel is the expected way this thread's
                 * work gets discarded. */
                let _ = tx.send(Completion { id, result });
            })
            .map_err(|err| {
                EngineError::Internal(format!("failed to spawn transfer thread: {err}"))
            })?;

        self.outstanding.insert(id);
        Ok(())
    }

    fn remove(&mut self, id: TransferId) -> Result<(), EngineError> {
        if self.outstanding.remove(&id) {
            /* Still running: mark it so the late completion is dropped. */
            self.abandoned.insert(id);
            log::debug!("transfer {id} abandoned before completion");
        }
        Ok(())
    }

    fn step(&mut self) -> Result<usize, EngineError> {
        /* Progress happens on the transfer threads; stepping is pure
         * bookkeeping for this engine. */
        Ok(self.outstanding.len())
    }

    fn readiness(&self) -> Readiness<'_> {
        Readiness {
            events: Some(&self.rx),
            next_poll: None,
        }
    }

    fn drain_completions(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        for completion in self.rx.try_iter() {
            self.outstanding.remove(&completion.id);
            if self.abandoned.remove(&completion.id) {
                log::debug!("discarding completion for abandoned transfer {}", completion.id);
                continue;
            }
            done.push(completion);
        }
        done
    }
}
