// Copyright (c) 2024 Lattice Wallet Contributors

//! Domain records persisted by the local ledger mirror (spec §3, §6).
//! These are the typed values behind each table's opaque `BLOB` column;
//! `bincode` is the wire format between the struct and the column.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 256-bit account identifier (a public key). The all-zero value is the
/// sentinel "unset" account (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub const ZERO: AccountId = AccountId([0u8; 32]);

    pub fn is_unset(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

/// 256-bit block hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

/// Marks an account as HD-derived (its seed slot) or imported ad-hoc.
pub const IMPORTED_ACCOUNT_INDEX: u32 = u32::MAX;

/// Per-wallet, per-account record: the HD index (or [`IMPORTED_ACCOUNT_INDEX`]
/// for an imported key), the wrapped private key, and the cached public key
/// (spec §3 "accounts").
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletAccountInfo {
    pub index: u32,
    pub private_key_ct: Vec<u8>,
    pub public_key: AccountId,
}

impl WalletAccountInfo {
    pub fn is_imported(&self) -> bool {
        self.index == IMPORTED_ACCOUNT_INDEX
    }
}

/// Persisted wallet envelope (spec §3 "Wallet"), minus the in-memory-only
/// password fan which never touches disk.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    pub version: u32,
    pub index: u32,
    pub selected_account_id: u32,
    pub salt: [u8; 32],
    pub key_ct: Vec<u8>,
    pub seed_ct: Vec<u8>,
    pub check_ct: Vec<u8>,
}

pub const WALLET_VERSION: u32 = 1;

/// Local-mirror bookkeeping for one owned account (spec §3 "AccountInfo").
/// `confirmed_height = None` is the spec's `INVALID` sentinel: no block of
/// this account has been confirmed by the remote node yet.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub head_hash: BlockHash,
    pub head_height: u64,
    pub confirmed_height: Option<u64>,
    pub forks: u32,
}

/// A pending incoming value credited by some remote SEND whose RECEIVE
/// counterpart has not yet been authored (spec §3 "Receivable").
#[derive(Clone, Serialize, Deserialize)]
pub struct ReceivableInfo {
    pub source_account: AccountId,
    pub amount: u128,
    pub timestamp: u64,
}
