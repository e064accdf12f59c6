// Copyright (c) 2024 Lattice Wallet Contributors

//! The `Wallets` collection (spec §3 "Wallets collection", §9
//! "Self-referential ownership"). Holds every open `Wallet`, the selected
//! wallet id, and the `received` set shared between the authoring and sync
//! paths. Constructed behind an `Arc` so that queued closures can capture a
//! `Weak<Wallets>` and upgrade on entry, per spec §9 — if the upgrade fails
//! the wallet system has already been torn down and the closure is a no-op.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use slog::{info, Logger};

use crate::{
    block::{Block, Opcode},
    db::{
        block::BlockModel,
        models::{AccountId, BlockHash},
        wallet_info::{SelectedWalletId, SelectedWalletIdModel, WalletAccountInfoModel, WalletInfoModel},
        Conn, LedgerDb,
    },
    error::WalletError,
    wallet::{Wallet, WalletAccountInfo, WalletInfo},
};

struct WalletsState {
    wallets: Vec<(u32, Arc<Wallet>)>,
    selected_wallet_id: Option<u32>,
    received: HashSet<BlockHash>,
}

pub struct Wallets {
    state: Mutex<WalletsState>,
    ledger_db: LedgerDb,
    logger: Logger,
}

impl Wallets {
    pub fn new(ledger_db: LedgerDb, logger: Logger) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WalletsState {
                wallets: Vec::new(),
                selected_wallet_id: None,
                received: HashSet::new(),
            }),
            ledger_db,
            logger,
        })
    }

    /// Loads every persisted wallet and its accounts, then rebuilds the
    /// `received` set by scanning each owned account's chain (spec §3
    /// "Received set"; supplemented per `original_source`'s `Wallets::Init`,
    /// see SPEC_FULL.md section F.4).
    pub fn load_all(&self) -> Result<(), WalletError> {
        let mut conn = self.ledger_db.get_conn()?;
        let wallet_infos = WalletInfo::get_all(&mut conn)?;
        let selected = SelectedWalletId::get(&mut conn)?;

        let mut state = self.state.lock().expect("wallets mutex poisoned");
        for (wallet_id, info) in wallet_infos {
            let accounts = WalletAccountInfo::get_all(&mut conn, wallet_id)?;
            let wallet = Arc::new(Wallet::open(wallet_id, info, accounts, self.logger.clone()));
            state.wallets.push((wallet_id, wallet));
        }
        state.selected_wallet_id = selected;
        drop(state);

        self.rebuild_received_set(&mut conn)?;
        info!(self.logger, "loaded wallets"; "count" => self.state.lock().expect("wallets mutex poisoned").wallets.len());
        Ok(())
    }

    fn rebuild_received_set(&self, conn: &mut Conn) -> Result<(), WalletError> {
        let accounts: Vec<AccountId> = {
            let state = self.state.lock().expect("wallets mutex poisoned");
            state
                .wallets
                .iter()
                .flat_map(|(_, w)| w.accounts())
                .map(|(_, pk, _)| pk)
                .collect()
        };

        let mut received = HashSet::new();
        for account in accounts {
            let mut height = 0u64;
            while let Some(block) = Block::get_by_account_height(conn, &account, height)? {
                if block.opcode == Opcode::Receive {
                    received.insert(BlockHash(block.link));
                }
                height += 1;
            }
        }

        let mut state = self.state.lock().expect("wallets mutex poisoned");
        state.received = received;
        Ok(())
    }

    /// `create_wallet` analogue: allocate a new wallet id, create it with
    /// `password`, persist it, and select it if nothing else is selected.
    pub fn create_wallet(&self, password: &str) -> Result<u32, WalletError> {
        let wallet_id = {
            let state = self.state.lock().expect("wallets mutex poisoned");
            state.wallets.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1
        };
        let wallet = Arc::new(Wallet::create(wallet_id, password, self.logger.clone())?);

        let mut conn = self.ledger_db.get_conn()?;
        wallet.store(&mut conn)?;

        let mut state = self.state.lock().expect("wallets mutex poisoned");
        state.wallets.push((wallet_id, wallet));
        if state.selected_wallet_id.is_none() {
            state.selected_wallet_id = Some(wallet_id);
            SelectedWalletId::put(&mut conn, wallet_id)?;
        }
        Ok(wallet_id)
    }

    pub fn wallet(&self, wallet_id: u32) -> Result<Arc<Wallet>, WalletError> {
        let state = self.state.lock().expect("wallets mutex poisoned");
        state
            .wallets
            .iter()
            .find(|(id, _)| *id == wallet_id)
            .map(|(_, w)| w.clone())
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    pub fn selected_wallet(&self) -> Result<Arc<Wallet>, WalletError> {
        let wallet_id = {
            let state = self.state.lock().expect("wallets mutex poisoned");
            state.selected_wallet_id.ok_or(WalletError::NoSelectedWallet)?
        };
        self.wallet(wallet_id)
    }

    pub fn select_wallet(&self, wallet_id: u32) -> Result<(), WalletError> {
        self.wallet(wallet_id)?;
        let mut conn = self.ledger_db.get_conn()?;
        SelectedWalletId::put(&mut conn, wallet_id)?;
        let mut state = self.state.lock().expect("wallets mutex poisoned");
        state.selected_wallet_id = Some(wallet_id);
        Ok(())
    }

    /// Copies the wallet list so long-running scans don't hold the lock
    /// (spec §5 "All long-running operations copy the wallet list first").
    pub fn all_wallets(&self) -> Vec<Arc<Wallet>> {
        let state = self.state.lock().expect("wallets mutex poisoned");
        state.wallets.iter().map(|(_, w)| w.clone()).collect()
    }

    /// `is_my_account(pk)` (spec §4.2) lifted to the whole collection: used
    /// by `process_block`'s ownership gate (spec §4.6).
    pub fn is_my_account(&self, account: AccountId) -> bool {
        self.all_wallets().iter().any(|w| w.is_my_account(account))
    }

    pub fn received_contains(&self, hash: &BlockHash) -> bool {
        self.state.lock().expect("wallets mutex poisoned").received.contains(hash)
    }

    pub fn received_insert(&self, hash: BlockHash) {
        self.state.lock().expect("wallets mutex poisoned").received.insert(hash);
    }

    pub fn received_remove(&self, hash: &BlockHash) {
        self.state.lock().expect("wallets mutex poisoned").received.remove(hash);
    }

    pub fn ledger_db(&self) -> &LedgerDb {
        &self.ledger_db
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}
