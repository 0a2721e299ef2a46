/**
 * Cross-thread wake primitive for the worker's blocking wait.
 *
 * Any caller thread may `raise()` it, any number of times, without
 * blocking; raises between two consumption points collapse into a single
 * "signalled" state. The worker registers `receiver()` in its multiplexed
 * `Select` wait and calls `consume_and_test()` after waking to drain
 * whatever accumulated.
 *
 * A `bounded(1)` channel gives exactly these semantics: a `try_send` into
 * a full channel means a signal is already pending, which is the collapse.
 * The original self-pipe trick needed a fallible OS pipe; a channel cannot
 * fail to construct, so there is no startup error here.
 */
use crossbeam_channel::{bounded, Receiver, Sender};

pub(crate) struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /**
     * Signals the worker. Non-blocking, callable from any thread.
     *
     * A full channel already carries a pending signal, so the error from
     * `try_send` is the collapse, not a failure. Disconnection cannot
     * happen while `self` owns the receiving side.
     */
    pub(crate) fn raise(&self) {
        let _ = self.tx.try_send(());
    }

    /**
     * Drains pending signals and reports whether any had been raised since
     * the last consume. Worker thread only.
     */
    pub(crate) fn consume_and_test(&self) -> bool {
        let mut signalled = false;
        while self.rx.try_recv().is_ok() {
            signalled = true;
        }
        signalled
    }

    /// The readiness source to register in a blocking multiplexed wait.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
