// Copyright (c) 2024 Lattice Wallet Contributors

//! Observer fan-out (spec §4.10): one subscriber registry per event class,
//! delivered on a background executor so callbacks never run with core
//! locks held and never block the action worker. Grounded on the teacher's
//! `WsEventsPoller` channel-draining pattern, generalized from one event
//! type to the registry-per-class shape spec §4.10 calls for.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use slog::{debug, o, Logger};

use crate::{
    block::Block,
    db::models::{AccountId, BlockHash, ReceivableInfo},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

type Callback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// A boxed, already-applied notification ready to run on the executor
/// thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Dispatches observer callbacks on a single background thread (spec
/// §4.10's "user-supplied background executor"; this default simply owns
/// one rather than taking an external one, since no host toolkit is in
/// scope here).
struct Executor {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Executor {
    fn start(logger: Logger) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("observer-executor".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!(logger, "observer executor stopped");
            })
            .expect("failed to spawn observer-executor thread");
        Self { sender: Mutex::new(Some(sender)), handle: Mutex::new(Some(handle)) }
    }

    fn post(&self, job: Job) {
        // A closed receiver only happens once `Observers` itself is being
        // torn down; dropping the job silently is correct there.
        if let Some(sender) = self.sender.lock().expect("executor sender mutex poisoned").as_ref() {
            let _ = sender.send(job);
        }
    }

    /// Drops the sending half so the executor thread's `recv()` loop ends,
    /// then joins it. Must run in that order or the join blocks forever.
    fn shutdown(&self) {
        self.sender.lock().expect("executor sender mutex poisoned").take();
        if let Some(handle) = self.handle.lock().expect("executor handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// The full set of event-class registries plus their shared executor (spec
/// §4.10). Cloning an `Arc<Observers>` is how every other subsystem holds
/// onto it.
pub struct Observers {
    connection_status: Mutex<Vec<Callback<ConnectionStatus>>>,
    block: Mutex<Vec<Callback<(Block, bool)>>>,
    selected_account: Mutex<Vec<Callback<AccountId>>>,
    selected_wallet: Mutex<Vec<Callback<u32>>>,
    lock: Mutex<Vec<Callback<bool>>>,
    password_set: Mutex<Vec<Callback<u32>>>,
    receivable: Mutex<Vec<Callback<(BlockHash, ReceivableInfo)>>>,
    executor: Executor,
    logger: Logger,
}

impl Observers {
    pub fn new(logger: Logger) -> Arc<Self> {
        let logger = logger.new(o!("component" => "observer"));
        Arc::new(Self {
            connection_status: Mutex::new(Vec::new()),
            block: Mutex::new(Vec::new()),
            selected_account: Mutex::new(Vec::new()),
            selected_wallet: Mutex::new(Vec::new()),
            lock: Mutex::new(Vec::new()),
            password_set: Mutex::new(Vec::new()),
            receivable: Mutex::new(Vec::new()),
            executor: Executor::start(logger.clone()),
            logger,
        })
    }

    pub fn on_connection_status(&self, callback: impl Fn(ConnectionStatus) + Send + Sync + 'static) {
        self.connection_status
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(callback));
    }

    pub fn on_block(&self, callback: impl Fn(Block, bool) + Send + Sync + 'static) {
        self.block
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(move |(block, rollback): (Block, bool)| callback(block, rollback)));
    }

    pub fn on_selected_account(&self, callback: impl Fn(AccountId) + Send + Sync + 'static) {
        self.selected_account
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(callback));
    }

    pub fn on_selected_wallet(&self, callback: impl Fn(u32) + Send + Sync + 'static) {
        self.selected_wallet
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(callback));
    }

    pub fn on_lock(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.lock.lock().expect("observer registry mutex poisoned").push(Arc::new(callback));
    }

    pub fn on_password_set(&self, callback: impl Fn(u32) + Send + Sync + 'static) {
        self.password_set
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(callback));
    }

    pub fn on_receivable(&self, callback: impl Fn(BlockHash, ReceivableInfo) + Send + Sync + 'static) {
        self.receivable
            .lock()
            .expect("observer registry mutex poisoned")
            .push(Arc::new(move |(hash, info): (BlockHash, ReceivableInfo)| callback(hash, info)));
    }

    pub fn notify_connection_status(&self, status: ConnectionStatus) {
        self.dispatch(&self.connection_status, status);
    }

    pub fn notify_block(&self, block: &Block, rollback: bool) {
        self.dispatch(&self.block, (block.clone(), rollback));
    }

    pub fn notify_selected_account(&self, account: AccountId) {
        self.dispatch(&self.selected_account, account);
    }

    pub fn notify_selected_wallet(&self, wallet_id: u32) {
        self.dispatch(&self.selected_wallet, wallet_id);
    }

    pub fn notify_lock(&self, locked: bool) {
        self.dispatch(&self.lock, locked);
    }

    pub fn notify_password_set(&self, wallet_id: u32) {
        self.dispatch(&self.password_set, wallet_id);
    }

    pub fn notify_receivable(&self, hash: &BlockHash, info: &ReceivableInfo) {
        self.dispatch(&self.receivable, (*hash, info.clone()));
    }

    /// Snapshots the registry's callbacks under its lock, then posts one
    /// executor job per callback so none of this runs on the caller's
    /// thread and callers never contend on `registry` itself (spec §4.10
    /// "never execute with core locks held").
    fn dispatch<T: Clone + Send + 'static>(&self, registry: &Mutex<Vec<Callback<T>>>, value: T) {
        let callbacks: Vec<Callback<T>> = registry.lock().expect("observer registry mutex poisoned").clone();
        if callbacks.is_empty() {
            return;
        }
        debug!(self.logger, "dispatching observer event"; "subscribers" => callbacks.len());
        for callback in callbacks {
            let value = value.clone();
            self.executor.post(Box::new(move || callback(value)));
        }
    }
}

impl Drop for Observers {
    fn drop(&mut self) {
        self.executor.shutdown();
    }
}
