#![allow(dead_code)]

/**
 * Test support: a scripted transfer engine.
 *
 * `MockEngine` implements `TransferEngine` without any network. Two
 * behaviours cover the scenarios the dispatcher must honor:
 *
 * - `AutoComplete { after_steps }` — every admitted transfer completes
 *   with HTTP 200 after that many engine steps, so timing is driven by
 *   the worker's own poll cadence.
 * - `Manual` — admitted transfers park until the test releases them
 *   through the shared `MockHandle`, which lets a test hold the in-flight
 *   set full while it observes queueing, bounds, and shutdown behavior.
 *
 * The handle survives worker restarts: each engine generation registers
 * its completion channel with the shared state on construction.
 */
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use courier::{
    Client, Completion, Config, EngineError, Readiness, TransferEngine, TransferId,
    TransferResult, TransferSpec,
};

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    AutoComplete { after_steps: u32 },
    Manual,
}

// ---------------------------------------------------------------------------
// Shared state & handle
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    /// Admission order across all generations.
    adds: Mutex<Vec<TransferId>>,

    /// Manual-mode transfers parked until released.
    waiting: Mutex<VecDeque<TransferId>>,

    /// The live generation's completion channel.
    sender: Mutex<Option<Sender<Completion>>>,

    /// How many engine generations the factory has produced.
    generations: AtomicUsize,
}

/// Test-side view of the engine, shared across worker generations.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
}

impl MockHandle {
    /// Total transfers ever admitted, in admission order.
    pub fn admitted(&self) -> Vec<TransferId> {
        self.state.adds.lock().expect("adds lock").clone()
    }

    pub fn admitted_count(&self) -> usize {
        self.state.adds.lock().expect("adds lock").len()
    }

    /// Manual mode: transfers admitted and not yet released.
    pub fn parked_count(&self) -> usize {
        self.state.waiting.lock().expect("waiting lock").len()
    }

    pub fn generations(&self) -> usize {
        self.state.generations.load(Ordering::SeqCst)
    }

    /**
     * Manual mode: completes the oldest parked transfer with HTTP 200.
     * Returns whether anything was parked.
     */
    pub fn release_one(&self) -> bool {
        let id = self.state.waiting.lock().expect("waiting lock").pop_front();
        let Some(id) = id else {
            return false;
        };
        if let Some(tx) = &*self.state.sender.lock().expect("sender lock") {
            let _ = tx.send(Completion {
                id,
                result: TransferResult::success(200, b"released".to_vec()),
            });
        }
        true
    }

    /// Manual mode: completes every parked transfer. Returns the count.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release_one() {
            released += 1;
        }
        released
    }
}

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

pub struct MockEngine {
    behavior: MockBehavior,
    state: Arc<MockState>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,

    /// Auto mode: `(id, age in steps)` for transfers not yet completed.
    running: Vec<(TransferId, u32)>,
}

impl MockEngine {
    fn new(behavior: MockBehavior, state: Arc<MockState>) -> Self {
        let (tx, rx) = unbounded();
        state.generations.fetch_add(1, Ordering::SeqCst);
        *state.sender.lock().expect("sender lock") = Some(tx.clone());
        Self {
            behavior,
            state,
            tx,
            rx,
            running: Vec::new(),
        }
    }
}

impl TransferEngine for MockEngine {
    fn add(&mut self, id: TransferId, _spec: TransferSpec) -> Result<(), EngineError> {
        self.state.adds.lock().expect("adds lock").push(id);
        match self.behavior {
            MockBehavior::AutoComplete { .. } => self.running.push((id, 0)),
            MockBehavior::Manual => self
                .state
                .waiting
                .lock()
                .expect("waiting lock")
                .push_back(id),
        }
        Ok(())
    }

    fn remove(&mut self, _id: TransferId) -> Result<(), EngineError> {
        Ok(())
    }

    fn step(&mut self) -> Result<usize, EngineError> {
        if let MockBehavior::AutoComplete { after_steps } = self.behavior {
            let mut still_running = Vec::new();
            for (id, age) in self.running.drain(..) {
                let age = age + 1;
                if age >= after_steps {
                    let _ = self.tx.send(Completion {
                        id,
                        result: TransferResult::success(200, b"done".to_vec()),
                    });
                } else {
                    still_running.push((id, age));
                }
            }
            self.running = still_running;
        }
        Ok(self.running.len() + self.state.waiting.lock().expect("waiting lock").len())
    }

    fn readiness(&self) -> Readiness<'_> {
        let next_poll = match self.behavior {
            /* Progress only happens when stepped, so keep the worker
             * ticking at a brisk test cadence. */
            MockBehavior::AutoComplete { .. } => Some(Duration::from_millis(2)),
            /* Releases arrive through the event channel; no polling needed. */
            MockBehavior::Manual => None,
        };
        Readiness {
            events: Some(&self.rx),
            next_poll,
        }
    }

    fn drain_completions(&mut self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Client constructors
// ---------------------------------------------------------------------------

/// A client driving a scripted mock engine.
pub fn mock_client(config: Config, behavior: MockBehavior) -> (Client, MockHandle) {
    let state = Arc::new(MockState::default());
    let handle = MockHandle {
        state: state.clone(),
    };
    let client = Client::with_engine(
        config,
        move || -> Result<Box<dyn TransferEngine>, EngineError> {
            Ok(Box::new(MockEngine::new(behavior, state.clone())))
        },
    );
    (client, handle)
}

/// A client whose engine factory always fails.
pub fn failing_client(config: Config) -> Client {
    Client::with_engine(config, || -> Result<Box<dyn TransferEngine>, EngineError> {
        Err(EngineError::Setup("no multiplex context".into()))
    })
}

// ---------------------------------------------------------------------------
// Timing helper
// ---------------------------------------------------------------------------

/**
 * Polls `cond` until it holds or `timeout` elapses. Returns the final
 * evaluation, so `assert!(wait_until(..))` reads as "eventually true".
 */
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
