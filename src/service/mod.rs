// Copyright (c) 2024 Lattice Wallet Contributors

//! `WalletCore`: the facade tying every subsystem together (SPEC_FULL.md
//! Section A). Grounded on the teacher's top-level `WalletService`, which
//! owns the ledger db, the peer connection manager, and the sync thread
//! behind one struct that the HTTP layer calls into; here the callers are
//! direct method calls rather than JSON-RPC, but the ownership shape is the
//! same.

use std::sync::Arc;

use rand::rngs::OsRng;
use slog::{info, o, Logger};
use url::Url;

use crate::{
    block::{authoring, authoring::AuthoringContext, constants::credit_price, Block, BlockType},
    config::CoreConfig,
    db::{
        account_info::AccountInfoModel,
        block::BlockModel,
        models::{AccountId, AccountInfo, ReceivableInfo},
        receivable::ReceivableInfoModel,
        LedgerDb,
    },
    error::{CoreError, WalletError},
    observer::Observers,
    queue::{ActionQueue, Priority},
    sync::{
        messages::{BlockCodec, DefaultBlockCodec},
        SyncEngine,
    },
    util::now_unix,
    wallet::{wallets::Wallets, Wallet},
    ws::{Transport, WsRunner},
};

/// Outcome of one authoring request, delivered to the caller's
/// [`AuthoringCallback`] exactly once from the action-worker thread (spec
/// §4.4 step 10, §6, §7). `Ok(None)` covers `receive_oldest` finding nothing
/// pending to receive; every other action always produces `Ok(Some(block))`
/// on success.
pub type AuthoringCallback = Box<dyn FnOnce(Result<Option<Block>, CoreError>) + Send>;

/// Owns every long-lived subsystem and threads (ledger db, action queue,
/// sync engine, WebSocket runner, observer registry) for one running wallet
/// instance. Cloning is cheap: everything inside is `Arc`.
#[derive(Clone)]
pub struct WalletCore {
    wallets: Arc<Wallets>,
    queue: Arc<ActionQueue>,
    sync: SyncEngine,
    observers: Arc<Observers>,
    ws: Arc<WsRunner>,
    preconfigured_reps: Vec<AccountId>,
    block_type: BlockType,
    logger: Logger,
}

impl WalletCore {
    /// Boots every subsystem and starts the background threads (spec §5
    /// "Threads"). Fails fatally if no preconfigured representative is
    /// configured, since opening an account by RECEIVE would then have no
    /// way to pick one (spec §6).
    pub fn start(config: CoreConfig, logger: Logger) -> Result<Self, CoreError> {
        if config.preconfigured_reps.is_empty() {
            return Err(CoreError::Fatal(
                "at least one preconfigured representative is required".to_string(),
            ));
        }

        let logger = logger.new(o!("component" => "core"));
        let ledger_db = LedgerDb::open(
            config
                .wallet_db_path
                .to_str()
                .ok_or_else(|| CoreError::Fatal("wallet_db_path is not valid UTF-8".to_string()))?,
            logger.clone(),
        )?;

        let wallets = Wallets::new(ledger_db, logger.clone());
        wallets.load_all()?;

        let queue = ActionQueue::start(logger.clone());
        let observers = Observers::new(logger.clone());
        let codec: Arc<dyn BlockCodec> = Arc::new(DefaultBlockCodec);

        let url = Url::parse(&config.server.url())
            .map_err(|e| CoreError::Fatal(format!("invalid server url: {e}")))?;

        let sync_wallets = wallets.clone();
        let sync_queue = queue.clone();
        let sync_codec = codec.clone();
        let sync_observers = observers.clone();
        let sync_logger = logger.clone();

        // `Transport` is only known once the WebSocket runner exists, and the
        // runner's message callback needs a `SyncEngine` to dispatch into;
        // the two are constructed together via a `OnceLock`-style handoff so
        // each can reference the other without an actual cycle on the heap.
        let sync_cell: Arc<std::sync::OnceLock<SyncEngine>> = Arc::new(std::sync::OnceLock::new());
        let on_message_cell = sync_cell.clone();
        let on_connected_cell = sync_cell.clone();

        let ws = WsRunner::start(
            url,
            observers.clone(),
            move |raw: &str| {
                if let Some(engine) = on_message_cell.get() {
                    engine.handle_inbound(raw);
                }
            },
            move || {
                if let Some(engine) = on_connected_cell.get() {
                    // Re-subscribe every owned account before syncing so the
                    // node starts pushing block/confirm/rollback notifies
                    // for them again (spec §4.9).
                    engine.subscribe_all_accounts();
                    engine.sync_cycle();
                }
            },
            logger.clone(),
        );

        let transport: Arc<dyn Transport> = ws.clone();
        let sync = SyncEngine::new(sync_wallets, sync_queue, transport, sync_codec, sync_observers, sync_logger);
        let _ = sync_cell.set(sync.clone());

        info!(logger, "wallet core started");

        Ok(Self {
            wallets,
            queue,
            sync,
            observers,
            ws,
            preconfigured_reps: config.preconfigured_reps,
            block_type: config.block_type,
            logger,
        })
    }

    pub fn observers(&self) -> &Arc<Observers> {
        &self.observers
    }

    pub fn wallets(&self) -> &Arc<Wallets> {
        &self.wallets
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// Enqueues a full sync cycle at HIGH priority (user-triggered "sync
    /// now", distinct from the URGENT band reserved for inbound network
    /// events, spec §4.7).
    pub fn request_sync(&self) {
        let sync = self.sync.clone();
        self.queue.enqueue(Priority::High, move || sync.sync_cycle());
    }

    /// `create_wallet(password)` (spec §4.2), enqueued at HIGH so it runs on
    /// the single action-worker thread alongside every other user action.
    pub fn create_wallet(&self, password: String) -> Result<u32, WalletError> {
        self.wallets.create_wallet(&password)
    }

    pub fn select_wallet(&self, wallet_id: u32) -> Result<(), WalletError> {
        self.wallets.select_wallet(wallet_id)?;
        self.observers.notify_selected_wallet(wallet_id);
        Ok(())
    }

    pub fn unlock_wallet(&self, wallet_id: u32, password: &str) -> Result<bool, WalletError> {
        let wallet = self.wallets.wallet(wallet_id)?;
        let unlocked = wallet.attempt_password(password);
        if unlocked {
            self.observers.notify_lock(false);
        }
        Ok(unlocked)
    }

    pub fn lock_wallet(&self, wallet_id: u32) -> Result<(), WalletError> {
        let wallet = self.wallets.wallet(wallet_id)?;
        wallet.lock();
        self.observers.notify_lock(true);
        Ok(())
    }

    /// `change_password(new_password)` (spec §4.2): requires the wallet be
    /// unlocked, re-wraps the master key under a freshly derived KEK,
    /// persists the updated envelope, and fires the `password_set` observer
    /// (spec §4.10).
    pub fn change_password(&self, wallet_id: u32, new_password: &str) -> Result<(), WalletError> {
        let wallet = self.wallets.wallet(wallet_id)?;
        wallet.change_password(new_password)?;
        let mut conn = self.wallets.ledger_db().get_conn()?;
        wallet.store_info(&mut conn)?;
        self.observers.notify_password_set(wallet_id);
        Ok(())
    }

    pub fn select_account(&self, wallet_id: u32, account_id: u32) -> Result<(), WalletError> {
        let wallet = self.wallets.wallet(wallet_id)?;
        wallet.select_account(account_id)?;
        let (_, account, _) =
            wallet.accounts().into_iter().find(|(id, _, _)| *id == account_id).ok_or(WalletError::AccountNotFound)?;
        self.observers.notify_selected_account(account);
        Ok(())
    }

    /// Authors and publishes a CHANGE block for `account`, enqueued on the
    /// action worker at HIGH priority (spec §4.4, §4.7). `callback` is
    /// invoked exactly once, from the action-worker thread, with the
    /// outcome (spec §4.4 step 10, §6, §7).
    pub fn change_representative(
        &self,
        wallet_id: u32,
        account: AccountId,
        representative: AccountId,
        callback: AuthoringCallback,
    ) {
        self.enqueue_authoring(wallet_id, account, callback, move |_core, wallet, ctx| {
            let private_key = wallet.private_key(account)?;
            Ok(Some(authoring::change(ctx, &private_key, representative)?))
        });
    }

    /// Authors and publishes a CREDIT block (spec §4.4).
    pub fn buy_credit(&self, wallet_id: u32, account: AccountId, delta: u16, callback: AuthoringCallback) {
        self.enqueue_authoring(wallet_id, account, callback, move |_core, wallet, ctx| {
            let private_key = wallet.private_key(account)?;
            Ok(Some(authoring::credit(ctx, &private_key, delta)?))
        });
    }

    /// Authors and publishes a SEND block (spec §4.4).
    pub fn send(
        &self,
        wallet_id: u32,
        account: AccountId,
        destination: AccountId,
        amount: u128,
        callback: AuthoringCallback,
    ) {
        self.enqueue_authoring(wallet_id, account, callback, move |_core, wallet, ctx| {
            let private_key = wallet.private_key(account)?;
            Ok(Some(authoring::send(ctx, &private_key, destination, amount)?))
        });
    }

    /// Authors and publishes a RECEIVE block for the oldest pending
    /// receivable on `account` (spec §4.4, §4.5). Calls back with
    /// `Ok(None)` if there is nothing pending to receive.
    pub fn receive_oldest(&self, wallet_id: u32, account: AccountId, callback: AuthoringCallback) {
        self.enqueue_authoring(wallet_id, account, callback, move |core, wallet, ctx| {
            let mut conn = core.wallets.ledger_db().get_conn()?;
            let pending = ReceivableInfo::lower_bound(&mut conn, &account)?;
            let Some((source_hash, receivable)) = pending.into_iter().next() else {
                return Ok(None);
            };
            let private_key = wallet.private_key(account)?;
            let mut rng = OsRng;
            let block = authoring::receive(
                ctx,
                &private_key,
                source_hash,
                &receivable,
                &core.preconfigured_reps,
                &mut rng,
            )?;
            Ok(Some(block))
        });
    }

    fn enqueue_authoring<F>(&self, wallet_id: u32, account: AccountId, callback: AuthoringCallback, action: F)
    where
        F: FnOnce(&WalletCore, &Wallet, &AuthoringContext) -> Result<Option<Block>, CoreError> + Send + 'static,
    {
        let core = self.clone();
        self.queue.enqueue(Priority::High, move || {
            let result = core.run_authoring(wallet_id, account, action);
            if let Err(e) = &result {
                slog::error!(core.logger, "authoring action failed"; "account" => account.to_hex(), "error" => format!("{e}"));
            }
            callback(result);
        });
    }

    fn run_authoring<F>(&self, wallet_id: u32, account: AccountId, action: F) -> Result<Option<Block>, CoreError>
    where
        F: FnOnce(&WalletCore, &Wallet, &AuthoringContext) -> Result<Option<Block>, CoreError>,
    {
        let wallet = self.wallets.wallet(wallet_id)?;
        let mut conn = self.wallets.ledger_db().get_conn()?;
        let account_info = AccountInfo::get(&mut conn, &account)?;
        let head = match &account_info {
            Some(info) => Block::get_by_account_height(&mut conn, &account, info.head_height)?,
            None => None,
        };
        let ctx = AuthoringContext {
            account,
            account_info,
            head,
            block_type: self.block_type,
            now: now_unix(),
        };
        let block = match action(self, &wallet, &ctx)? {
            Some(block) => block,
            None => return Ok(None),
        };
        self.commit_authored_block(block.clone())?;
        Ok(Some(block))
    }

    /// Applies a freshly authored block to the local ledger mirror, exactly
    /// like an unconfirmed remote notify would (spec §4.4 step 8 "apply
    /// locally, unconfirmed"), then publishes it.
    fn commit_authored_block(&self, block: Block) -> Result<(), CoreError> {
        self.sync.process_block(&block, false)?;
        self.sync.publish_authored(&block)?;
        Ok(())
    }

    /// Price of one unit of credit at the current time (spec §4.4, exposed
    /// so a caller can show the cost before authoring a CREDIT/open-RECEIVE
    /// block).
    pub fn credit_price(&self) -> u128 {
        credit_price(now_unix())
    }

    /// Cooperative shutdown: unsubscribe every owned account best-effort,
    /// then stop the action worker, the WebSocket runner, and the observer
    /// executor (spec §5 "Stop()").
    pub fn stop(&self) {
        self.sync.unsubscribe_all_accounts();
        self.queue.stop();
        self.ws.stop();
    }
}
