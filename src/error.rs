// Copyright (c) 2024 Lattice Wallet Contributors

//! Error taxonomy for the wallet core, one `displaydoc` enum per subsystem.

use displaydoc::Display;

use crate::{block::AuthoringError, crypto::CryptoError, sync::SyncError};

#[derive(Display, Debug)]
pub enum LedgerDbError {
    /// Diesel error: {0}
    Diesel(diesel::result::Error),

    /// Connection pool error: {0}
    Pool(diesel::r2d2::PoolError),

    /// Encoding error: {0}
    Encode(bincode::Error),

    /// Entry not found: {0}
    NotFound(String),

    /// Duplicate entry: {0}
    Duplicate(String),

    /// Migration error: {0}
    Migration(String),
}

impl From<diesel::result::Error> for LedgerDbError {
    fn from(src: diesel::result::Error) -> Self {
        Self::Diesel(src)
    }
}

impl From<diesel::r2d2::PoolError> for LedgerDbError {
    fn from(src: diesel::r2d2::PoolError) -> Self {
        Self::Pool(src)
    }
}

impl From<bincode::Error> for LedgerDbError {
    fn from(src: bincode::Error) -> Self {
        Self::Encode(src)
    }
}

#[derive(Display, Debug)]
pub enum WalletError {
    /// Wallet is locked
    WalletLocked,

    /// No wallet is selected
    NoSelectedWallet,

    /// No account is selected
    NoSelectedAccount,

    /// Wallet not found: {0}
    WalletNotFound(u32),

    /// Account not found in wallet
    AccountNotFound,

    /// Account already imported
    AccountExists,

    /// Error persisting wallet info: {0}
    WalletInfoPut(LedgerDbError),

    /// Error persisting wallet account info: {0}
    WalletAccountInfoPut(LedgerDbError),

    /// Error reading from the ledger mirror: {0}
    Ledger(LedgerDbError),

    /// Crypto envelope error: {0}
    Crypto(CryptoError),
}

impl From<LedgerDbError> for WalletError {
    fn from(src: LedgerDbError) -> Self {
        Self::Ledger(src)
    }
}

impl From<CryptoError> for WalletError {
    fn from(src: CryptoError) -> Self {
        Self::Crypto(src)
    }
}

#[derive(Display, Debug)]
pub enum CoreError {
    /// Wallet error: {0}
    Wallet(WalletError),

    /// Authoring error: {0}
    Authoring(AuthoringError),

    /// Ledger mirror error: {0}
    Ledger(LedgerDbError),

    /// Sync error: {0}
    Sync(SyncError),

    /// Fatal startup error: {0}
    Fatal(String),
}

impl From<WalletError> for CoreError {
    fn from(src: WalletError) -> Self {
        Self::Wallet(src)
    }
}

impl From<AuthoringError> for CoreError {
    fn from(src: AuthoringError) -> Self {
        Self::Authoring(src)
    }
}

impl From<LedgerDbError> for CoreError {
    fn from(src: LedgerDbError) -> Self {
        Self::Ledger(src)
    }
}

impl From<SyncError> for CoreError {
    fn from(src: SyncError) -> Self {
        Self::Sync(src)
    }
}
