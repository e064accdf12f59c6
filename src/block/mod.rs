// Copyright (c) 2024 Lattice Wallet Contributors

//! Block authoring (spec §4.4) and local application (spec §4.6).
//!
//! Block-type-specific serialization beyond the shared header fields is an
//! explicit non-goal (spec §1); this module only models the fields every
//! block type shares and signs/hashes over those.

pub mod authoring;
pub mod constants;

use blake2::{Blake2b, Digest};
use displaydoc::Display;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::db::models::{AccountId, BlockHash};

/// The two block "kinds" recognized at the header level (spec §3, §6).
/// `TxBlock` carries an opaque note payload on top of the shared fields;
/// `AdBlock` does not. Field-level layout beyond this distinction is out of
/// scope (spec §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    TxBlock,
    AdBlock,
}

/// The operation a block performs (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    Send,
    Receive,
    Change,
    Credit,
}

/// A signed successor block (spec §3 "Block"). `link` is context-specific:
/// the destination account for `SEND`, the source block hash for `RECEIVE`,
/// and zero otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub block_type: BlockType,
    pub opcode: Opcode,
    pub credit: u16,
    pub counter: u32,
    pub timestamp: u64,
    pub height: u64,
    pub account: AccountId,
    pub previous: BlockHash,
    pub representative: AccountId,
    pub balance: u128,
    pub link: [u8; 32],
    /// Opaque `TX_BLOCK`-only payload; absent on `AD_BLOCK`s. The note's
    /// internal structure is block-type-specific serialization and out of
    /// scope here (spec §1).
    pub note: Option<Vec<u8>>,
    pub signature: [u8; 64],
}

#[derive(Display, Debug)]
pub enum BlockError {
    /// Signature does not verify against the block's account
    InvalidSignature,
}

impl Block {
    /// Canonical content hash, computed over every field except the
    /// signature. This both identifies the block and is the message that
    /// gets signed.
    pub fn content_hash(&self) -> BlockHash {
        let mut hasher = Blake2b::<typenum_u32::U32>::new();
        hasher.update([self.block_type_tag()]);
        hasher.update([self.opcode_tag()]);
        hasher.update(self.credit.to_be_bytes());
        hasher.update(self.counter.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.account.0);
        hasher.update(self.previous.0);
        hasher.update(self.representative.0);
        hasher.update(self.balance.to_be_bytes());
        hasher.update(self.link);
        if let Some(note) = &self.note {
            hasher.update(note);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        BlockHash(out)
    }

    fn block_type_tag(&self) -> u8 {
        match self.block_type {
            BlockType::TxBlock => 0,
            BlockType::AdBlock => 1,
        }
    }

    fn opcode_tag(&self) -> u8 {
        match self.opcode {
            Opcode::Send => 0,
            Opcode::Receive => 1,
            Opcode::Change => 2,
            Opcode::Credit => 3,
        }
    }

    /// Signs `self` with `private_key`, filling in `self.signature`, and
    /// returns the signature for convenience.
    pub fn sign(&mut self, private_key: &crate::crypto::RawKey) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(private_key);
        let sig = signing_key.sign(self.content_hash().0.as_slice());
        self.signature = sig.to_bytes();
        self.signature
    }

    /// Verifies `self.signature` over `self.content_hash()` against
    /// `self.account` (spec §8 invariant 11).
    pub fn verify(&self) -> Result<(), BlockError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.account.0).map_err(|_| BlockError::InvalidSignature)?;
        let sig = Signature::from_bytes(&self.signature);
        verifying_key
            .verify_strict(self.content_hash().0.as_slice(), &sig)
            .map_err(|_| BlockError::InvalidSignature)
    }
}

/// Derives the Ed25519 public key for a raw private key, used by HD
/// derivation (spec §4.2) and account import.
pub fn public_key_for(private_key: &crate::crypto::RawKey) -> AccountId {
    let signing_key = SigningKey::from_bytes(private_key);
    AccountId(signing_key.verifying_key().to_bytes())
}

// ed25519-dalek re-exports `Signer`/`Verifier` traits under its prelude; bring
// them in scope for the `sign`/`verify_strict` calls above without exposing
// them to callers of this module.
use ed25519_dalek::Signer;

/// `Blake2b` is generic over digest length; this alias exists purely so the
/// `typenum` size constant reads clearly at the call site above.
mod typenum_u32 {
    pub use blake2::digest::consts::U32;
}
