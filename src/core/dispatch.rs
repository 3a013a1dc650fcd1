//! Cross-thread dispatch onto the engine thread.
//!
//! Clients submit closures; the engine thread drains them between
//! playback steps via [`DispatchQueue::process`]. Three submission
//! modes exist:
//!
//! - [`run`](DispatchQueue::run): block the caller until the closure
//!   ran once on the engine thread, and return its result. The
//!   round-trip uses a one-slot channel, sender on the engine side.
//! - [`enqueue`](DispatchQueue::enqueue): fire-and-forget. The queue
//!   owns the closure and everything it captured; both are dropped
//!   right after it ran.
//! - [`suspend`](DispatchQueue::suspend) /
//!   [`resume`](DispatchQueue::resume): reference-counted cooperative
//!   pause. While the suspend count is nonzero the engine parks at
//!   its next safe point but keeps serving the queue.
//!
//! # Ordering
//!
//! Submissions from one thread are served in submission order. There
//! is no ordering between threads.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

type Work<C> = Box<dyn FnOnce(&mut C) + Send>;

#[derive(Debug, Default)]
struct DispatchState {
    /// Active suspend() calls not yet resumed.
    suspends: u32,
    /// An engine loop is currently servicing this queue.
    attached: bool,
    /// The engine is parked inside process() at a safe point.
    safe_point: bool,
    /// A pending interrupt() not yet consumed by process().
    interrupted: bool,
}

/// MPSC closure queue with blocking round-trips and suspension.
///
/// `C` is the engine-side context handed to every closure; only the
/// thread calling [`process`](DispatchQueue::process) ever touches it.
pub struct DispatchQueue<C> {
    tx: Sender<Work<C>>,
    rx: Receiver<Work<C>>,
    state: Mutex<DispatchState>,
    cond: Condvar,
}

impl<C> Default for DispatchQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> DispatchQueue<C> {
    pub fn new() -> DispatchQueue<C> {
        let (tx, rx) = unbounded();
        DispatchQueue {
            tx,
            rx,
            state: Mutex::new(DispatchState::default()),
            cond: Condvar::new(),
        }
    }

    /// Enqueue work and return immediately. The closure and its
    /// captures are dropped after it ran (or when the queue is
    /// dropped, if the engine never gets to it).
    pub fn enqueue(&self, f: impl FnOnce(&mut C) + Send + 'static) {
        let _ = self.tx.send(Box::new(f));
        // Lock so a concurrent process() can't check the queue and
        // start waiting between our send and this notify.
        let _st = self.state.lock().unwrap();
        self.cond.notify_all();
    }

    /// Run a closure on the engine thread and wait for its result.
    ///
    /// Returns `None` only if the closure was dropped without running,
    /// which can't happen while an engine loop services the queue.
    /// Submissions from this thread made earlier with `enqueue` are
    /// served first.
    pub fn run<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> T + Send + 'static,
    {
        let (done_tx, done_rx) = bounded(1);
        self.enqueue(move |ctx| {
            let _ = done_tx.send(f(ctx));
        });
        done_rx.recv().ok()
    }

    /// Pause the engine at its next safe point. Blocks until the
    /// engine acknowledges the safe point (returns immediately when
    /// no engine loop is attached). May be called multiple times;
    /// every call must be balanced by one [`resume`](Self::resume).
    /// The queue keeps being served while suspended.
    pub fn suspend(&self) {
        let mut st = self.state.lock().unwrap();
        st.suspends += 1;
        self.cond.notify_all();
        while st.attached && !st.safe_point {
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Undo one [`suspend`](Self::suspend). Calling with no suspend
    /// outstanding is a fatal programmer error.
    pub fn resume(&self) {
        let mut st = self.state.lock().unwrap();
        assert!(st.suspends > 0, "unbalanced dispatch resume");
        st.suspends -= 1;
        if st.suspends == 0 {
            self.cond.notify_all();
        }
    }

    /// Make a blocked [`process`](Self::process) return early so the
    /// engine loop re-checks its own state.
    pub fn interrupt(&self) {
        let mut st = self.state.lock().unwrap();
        st.interrupted = true;
        self.cond.notify_all();
    }

    /// True while the suspend count is nonzero.
    pub fn suspended(&self) -> bool {
        self.state.lock().unwrap().suspends > 0
    }

    /// Mark this queue as being serviced by an engine loop. Called by
    /// the engine thread before its first `process`.
    pub(crate) fn attach(&self) {
        self.state.lock().unwrap().attached = true;
    }

    /// Engine loop is gone; release any blocked suspenders.
    pub(crate) fn detach(&self) {
        let mut st = self.state.lock().unwrap();
        st.attached = false;
        self.cond.notify_all();
    }

    /// Engine-side drain. Serves queued work until the queue has been
    /// idle up to `timeout`, or an interrupt arrives. While suspended
    /// this does not return; it parks at the safe point and keeps
    /// serving work until the last resume.
    pub fn process(&self, ctx: &mut C, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap();
        loop {
            if let Ok(work) = self.rx.try_recv() {
                drop(st);
                work(ctx);
                st = self.state.lock().unwrap();
                continue;
            }
            if st.suspends > 0 {
                if !st.safe_point {
                    st.safe_point = true;
                    self.cond.notify_all();
                }
                st = self.cond.wait(st).unwrap();
                continue;
            }
            st.safe_point = false;
            if st.interrupted {
                st.interrupted = false;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self.cond.wait_timeout(st, deadline - now).unwrap();
            st = guard;
        }
    }
}
