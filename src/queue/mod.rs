// Copyright (c) 2024 Lattice Wallet Contributors

//! Priority action queue & single-worker scheduler (spec §4.7). Grounded on
//! the teacher's `service/sync.rs` `SyncThread` for the
//! stop-flag/join-on-drop thread lifecycle; the priority ordering itself has
//! no teacher analogue and is built directly from spec §4.7/§5.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
        Arc, Condvar, Mutex,
    },
    thread,
};

use slog::{debug, error, Logger};

/// Priority bands, highest first (spec §4.7). `URGENT` is reserved for
/// network-triggered reconciliation; `HIGH` for user-initiated authoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

type Action = Box<dyn FnOnce() + Send + 'static>;

struct QueuedAction {
    priority: Priority,
    seq: u64,
    action: Action,
}

impl PartialEq for QueuedAction {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedAction {}

impl PartialOrd for QueuedAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedAction {
    /// `BinaryHeap` is a max-heap: order by priority first, then by
    /// *earliest* insertion within a priority (lower `seq` sorts greater),
    /// giving FIFO ordering within a band (spec §4.7 "Ordering within a
    /// priority is insertion order").
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedAction>,
}

/// The shared priority queue plus its single draining worker thread.
pub struct ActionQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
    next_seq: AtomicU64,
    stopped: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    logger: Logger,
}

impl ActionQueue {
    pub fn start(logger: Logger) -> Arc<Self> {
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState { heap: BinaryHeap::new() }),
            condvar: Condvar::new(),
            next_seq: AtomicU64::new(0),
            stopped: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            logger,
        });

        let worker_queue = queue.clone();
        let handle = thread::Builder::new()
            .name("action-worker".to_string())
            .spawn(move || worker_queue.run())
            .expect("failed to spawn action-worker thread");
        *queue.worker.lock().expect("worker handle mutex poisoned") = Some(handle);
        queue
    }

    fn run(self: Arc<Self>) {
        debug!(self.logger, "action worker started");
        loop {
            let action = {
                let mut state = self.state.lock().expect("queue mutex poisoned");
                loop {
                    if self.stopped.load(AtomicOrdering::SeqCst) && state.heap.is_empty() {
                        debug!(self.logger, "action worker stopped");
                        return;
                    }
                    if let Some(queued) = state.heap.pop() {
                        break Some(queued.action);
                    }
                    state = self.condvar.wait(state).expect("queue condvar poisoned");
                }
            };
            if let Some(action) = action {
                // Intentionally outside the queue mutex: user closures must
                // not hold it during I/O (spec §4.7).
                action();
            }
        }
    }

    /// Enqueues `action` at `priority`; wakes the worker.
    pub fn enqueue<F>(&self, priority: Priority, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.heap.push(QueuedAction {
            priority,
            seq,
            action: Box::new(action),
        });
        self.condvar.notify_one();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests the worker stop after draining whatever is already queued,
    /// and joins it (spec §5 "Stop() ... joins the action worker").
    pub fn stop(&self) {
        self.stopped.store(true, AtomicOrdering::SeqCst);
        self.condvar.notify_all();
        if let Some(handle) = self.worker.lock().expect("worker handle mutex poisoned").take() {
            if let Err(e) = handle.join() {
                error!(self.logger, "action worker panicked"; "error" => format!("{e:?}"));
            }
        }
    }
}

impl Drop for ActionQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn drains_highest_priority_first() {
        let queue = ActionQueue::start(crate::logging::test_logger());
        let (tx, rx) = mpsc::channel();

        // Block the worker until every action is enqueued, so ordering is
        // deterministic regardless of scheduling.
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        queue.enqueue(Priority::Urgent, move || {
            let _ = gate_rx.recv();
        });
        let tx_low = tx.clone();
        queue.enqueue(Priority::Low, move || tx_low.send(Priority::Low).unwrap());
        let tx_urgent = tx.clone();
        queue.enqueue(Priority::Urgent, move || tx_urgent.send(Priority::Urgent).unwrap());
        let tx_high = tx.clone();
        queue.enqueue(Priority::High, move || tx_high.send(Priority::High).unwrap());
        gate_tx.send(()).unwrap();

        assert_eq!(rx.recv().unwrap(), Priority::Urgent);
        assert_eq!(rx.recv().unwrap(), Priority::High);
        assert_eq!(rx.recv().unwrap(), Priority::Low);
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = ActionQueue::start(crate::logging::test_logger());
        let (tx, rx) = mpsc::channel();

        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        queue.enqueue(Priority::Urgent, move || {
            let _ = gate_rx.recv();
        });
        for i in 0..5 {
            let tx = tx.clone();
            queue.enqueue(Priority::Normal, move || tx.send(i).unwrap());
        }
        gate_tx.send(()).unwrap();

        for expected in 0..5 {
            assert_eq!(rx.recv().unwrap(), expected);
        }
    }
}
