// Copyright (c) 2024 Lattice Wallet Contributors

//! One seed plus its derived/imported accounts (spec §4.2). A `Wallet`
//! guards its own state behind a single mutex (spec §5: "Wallet lock is
//! held across each of its methods; short critical sections; no I/O within")
//! and never performs I/O while holding it — callers pass in an already-open
//! `Conn` for the `store_*` methods.

pub mod wallets;

use std::sync::Mutex;

use blake2::{digest::consts::U32, Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand_core::RngCore;
use slog::{debug, Logger};

use crate::{
    crypto::{self, PasswordFan, RawKey, Salt},
    db::{
        models::{AccountId, IMPORTED_ACCOUNT_INDEX, WALLET_VERSION},
        wallet_info::{WalletAccountInfoModel, WalletInfoModel},
        Conn,
    },
    error::WalletError,
};

pub use crate::db::models::{WalletAccountInfo, WalletInfo};

type Blake2b256 = Blake2b<U32>;

/// Derives the HD private key at `index` from `seed` (spec §4.2):
/// `Blake2b-256(seed || u32_be(index))`.
pub fn derive_private_key(seed: &RawKey, index: u32) -> RawKey {
    let mut hasher = Blake2b256::new();
    hasher.update(seed);
    hasher.update(index.to_be_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

struct WalletState {
    info: WalletInfo,
    accounts: Vec<(u32, WalletAccountInfo)>,
    fan: PasswordFan,
}

/// An encrypted HD seed plus its ordered accounts (spec §3 "Wallet").
pub struct Wallet {
    pub id: u32,
    state: Mutex<WalletState>,
    logger: Logger,
}

impl Wallet {
    /// `create()` (spec §4.2): random salt, random master key, random seed,
    /// wrap both under the new password, derive account #0.
    pub fn create(id: u32, password: &str, logger: Logger) -> Result<Self, WalletError> {
        let mut rng = OsRng;
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(id, seed, password, logger)
    }

    /// `from_seed()` (spec §4.2): like `create()` but the seed is supplied.
    pub fn from_seed(id: u32, seed: RawKey, password: &str, logger: Logger) -> Result<Self, WalletError> {
        let mut rng = OsRng;
        let mut salt: Salt = [0u8; 32];
        rng.fill_bytes(&mut salt);
        let mut master_key: RawKey = [0u8; 32];
        rng.fill_bytes(&mut master_key);

        let kek = crypto::derive_kek(password, &salt)?;
        let key_ct = crypto::wrap(&master_key, &kek, &salt);
        let seed_ct = crypto::wrap(&seed, &master_key, &salt);
        let check_ct = crypto::encrypt_bytes(&[0u8; 32], &master_key, &salt);

        let info = WalletInfo {
            version: WALLET_VERSION,
            index: 0,
            selected_account_id: 0,
            salt,
            key_ct,
            seed_ct,
            check_ct,
        };

        let mut fan = PasswordFan::default();
        fan.set_with_rng(&kek, &mut rng);

        let wallet = Self {
            id,
            state: Mutex::new(WalletState {
                info,
                accounts: Vec::new(),
                fan,
            }),
            logger,
        };
        wallet.create_account()?;
        Ok(wallet)
    }

    /// `open()` (spec §4.2): reconstruct from a persisted record; the wallet
    /// starts locked.
    pub fn open(id: u32, info: WalletInfo, accounts: Vec<(u32, WalletAccountInfo)>, logger: Logger) -> Self {
        Self {
            id,
            state: Mutex::new(WalletState {
                info,
                accounts,
                fan: PasswordFan::default(),
            }),
            logger,
        }
    }

    /// `attempt_password(pw)` (spec §4.2): derive the KEK, stage it in the
    /// fan, and report whether it actually unlocks the wallet. Does not
    /// leave a wrong password staged.
    pub fn attempt_password(&self, password: &str) -> bool {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        let kek = match crypto::derive_kek(password, &state.info.salt) {
            Ok(kek) => kek,
            Err(_) => return false,
        };
        let mut rng = OsRng;
        state.fan.set_with_rng(&kek, &mut rng);
        let valid = Self::valid_password_locked(&state);
        if !valid {
            state.fan.lock();
        }
        valid
    }

    fn valid_password_locked(state: &WalletState) -> bool {
        let kek = state.fan.get();
        match crypto::unwrap(&state.info.key_ct, &kek, &state.info.salt) {
            Ok(master_key) => {
                let check = crypto::encrypt_bytes(&[0u8; 32], &master_key, &state.info.salt);
                check == state.info.check_ct
            }
            Err(_) => false,
        }
    }

    /// `change_password(pw)` (spec §4.2): requires unlocked; re-wraps the
    /// master key under a freshly derived KEK. `seed_ct`/`check_ct` are
    /// unchanged because they are wrapped under the master key, not the KEK.
    pub fn change_password(&self, new_password: &str) -> Result<(), WalletError> {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        let master_key = Self::master_key_locked(&state)?;

        let mut rng = OsRng;
        let new_kek = crypto::derive_kek(new_password, &state.info.salt)?;
        state.info.key_ct = crypto::wrap(&master_key, &new_kek, &state.info.salt);
        state.fan.set_with_rng(&new_kek, &mut rng);
        Ok(())
    }

    fn master_key_locked(state: &WalletState) -> Result<RawKey, WalletError> {
        if !Self::valid_password_locked(state) {
            return Err(WalletError::WalletLocked);
        }
        let kek = state.fan.get();
        Ok(crypto::unwrap(&state.info.key_ct, &kek, &state.info.salt)?)
    }

    /// `lock()` (spec §4.2): zero the fan.
    pub fn lock(&self) {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        state.fan.lock();
    }

    /// `seed()` (spec §4.2): requires unlocked.
    pub fn seed(&self) -> Result<RawKey, WalletError> {
        let state = self.state.lock().expect("wallet mutex poisoned");
        let master_key = Self::master_key_locked(&state)?;
        Ok(crypto::unwrap(&state.info.seed_ct, &master_key, &state.info.salt)?)
    }

    /// `create_account()` (spec §4.2): HD-derive the account at the
    /// wallet's current `index`, append it, and bump `index`.
    pub fn create_account(&self) -> Result<u32, WalletError> {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        let master_key = Self::master_key_locked(&state)?;
        let seed = crypto::unwrap(&state.info.seed_ct, &master_key, &state.info.salt)?;

        let index = state.info.index;
        let private_key = derive_private_key(&seed, index);
        let public_key = crate::block::public_key_for(&private_key);
        let private_key_ct = crypto::wrap(&private_key, &master_key, &state.info.salt);

        let account_id = next_account_id(&state.accounts);
        state.accounts.push((
            account_id,
            WalletAccountInfo {
                index,
                private_key_ct,
                public_key,
            },
        ));
        state.info.index = index + 1;
        if state.info.selected_account_id == 0 {
            state.info.selected_account_id = account_id;
        }
        debug!(self.logger, "created account"; "wallet_id" => self.id, "account_id" => account_id);
        Ok(account_id)
    }

    /// `import_account(keypair)` (spec §4.2): rejects duplicates by public
    /// key; stores with `index = IMPORTED_ACCOUNT_INDEX`.
    pub fn import_account(&self, private_key: RawKey) -> Result<u32, WalletError> {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        let master_key = Self::master_key_locked(&state)?;
        let public_key = crate::block::public_key_for(&private_key);

        if state.accounts.iter().any(|(_, a)| a.public_key == public_key) {
            return Err(WalletError::AccountExists);
        }

        let private_key_ct = crypto::wrap(&private_key, &master_key, &state.info.salt);
        let account_id = next_account_id(&state.accounts);
        state.accounts.push((
            account_id,
            WalletAccountInfo {
                index: IMPORTED_ACCOUNT_INDEX,
                private_key_ct,
                public_key,
            },
        ));
        if state.info.selected_account_id == 0 {
            state.info.selected_account_id = account_id;
        }
        Ok(account_id)
    }

    /// `accounts()` (spec §4.2): insertion order, `(id, public_key, is_adhoc)`.
    pub fn accounts(&self) -> Vec<(u32, AccountId, bool)> {
        let state = self.state.lock().expect("wallet mutex poisoned");
        state
            .accounts
            .iter()
            .map(|(id, a)| (*id, a.public_key, a.is_imported()))
            .collect()
    }

    /// `select_account(id)` (spec §4.2): must exist.
    pub fn select_account(&self, account_id: u32) -> Result<(), WalletError> {
        let mut state = self.state.lock().expect("wallet mutex poisoned");
        if !state.accounts.iter().any(|(id, _)| *id == account_id) {
            return Err(WalletError::AccountNotFound);
        }
        state.info.selected_account_id = account_id;
        Ok(())
    }

    pub fn selected_account_id(&self) -> u32 {
        self.state.lock().expect("wallet mutex poisoned").info.selected_account_id
    }

    /// `private_key(account)` (spec §4.2): requires unlocked; O(n) scan.
    pub fn private_key(&self, account: AccountId) -> Result<RawKey, WalletError> {
        let state = self.state.lock().expect("wallet mutex poisoned");
        let master_key = Self::master_key_locked(&state)?;
        let entry = state
            .accounts
            .iter()
            .find(|(_, a)| a.public_key == account)
            .ok_or(WalletError::AccountNotFound)?;
        Ok(crypto::unwrap(&entry.1.private_key_ct, &master_key, &state.info.salt)?)
    }

    /// `sign(account, message)` (spec §4.2): requires unlocked; delegates to
    /// the Ed25519-equivalent signer.
    pub fn sign(&self, account: AccountId, message: &[u8]) -> Result<[u8; 64], WalletError> {
        let private_key = self.private_key(account)?;
        let signing_key = SigningKey::from_bytes(&private_key);
        Ok(signing_key.sign(message).to_bytes())
    }

    /// `is_my_account(pk)` (spec §4.2).
    pub fn is_my_account(&self, account: AccountId) -> bool {
        let state = self.state.lock().expect("wallet mutex poisoned");
        state.accounts.iter().any(|(_, a)| a.public_key == account)
    }

    /// `empty_password()` (spec §4.2): whether the empty string is this
    /// wallet's password, without disturbing the currently-staged fan.
    pub fn empty_password(&self) -> bool {
        let state = self.state.lock().expect("wallet mutex poisoned");
        let kek = match crypto::derive_kek("", &state.info.salt) {
            Ok(kek) => kek,
            Err(_) => return false,
        };
        match crypto::unwrap(&state.info.key_ct, &kek, &state.info.salt) {
            Ok(master_key) => {
                crypto::encrypt_bytes(&[0u8; 32], &master_key, &state.info.salt) == state.info.check_ct
            }
            Err(_) => false,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        let state = self.state.lock().expect("wallet mutex poisoned");
        Self::valid_password_locked(&state)
    }

    /// `store_info(txn, wallet_id)` (spec §4.2).
    pub fn store_info(&self, conn: &mut Conn) -> Result<(), WalletError> {
        let state = self.state.lock().expect("wallet mutex poisoned");
        WalletInfo::put(conn, self.id, &state.info).map_err(WalletError::WalletInfoPut)
    }

    /// `store_account(txn, wallet_id, account_id)` (spec §4.2).
    pub fn store_account(&self, conn: &mut Conn, account_id: u32) -> Result<(), WalletError> {
        let state = self.state.lock().expect("wallet mutex poisoned");
        let (_, info) = state
            .accounts
            .iter()
            .find(|(id, _)| *id == account_id)
            .ok_or(WalletError::AccountNotFound)?;
        WalletAccountInfo::put(conn, self.id, account_id, info).map_err(WalletError::WalletAccountInfoPut)
    }

    /// `store(txn, wallet_id)` (spec §4.2): persist the full snapshot.
    pub fn store(&self, conn: &mut Conn) -> Result<(), WalletError> {
        self.store_info(conn)?;
        let account_ids: Vec<u32> = {
            let state = self.state.lock().expect("wallet mutex poisoned");
            state.accounts.iter().map(|(id, _)| *id).collect()
        };
        for account_id in account_ids {
            self.store_account(conn, account_id)?;
        }
        Ok(())
    }

}

fn next_account_id(accounts: &[(u32, WalletAccountInfo)]) -> u32 {
    accounts.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1
}
