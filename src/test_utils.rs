// Copyright (c) 2024 Lattice Wallet Contributors

//! Shared test fixtures (SPEC_FULL.md Section G): an in-memory ledger
//! mirror, a deterministic RNG, and a [`FakeTransport`] so `SyncEngine` can
//! be exercised without a real socket. Grounded on the teacher's
//! `test_utils.rs`, narrowed to what this crate's own tests need.

use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;

use crate::{db::LedgerDb, logging::test_logger, ws::Transport};

/// Opens a fresh in-memory ledger mirror with migrations applied.
pub fn test_ledger_db() -> LedgerDb {
    LedgerDb::open_in_memory(test_logger()).expect("failed to open in-memory ledger db")
}

/// A seeded RNG so authoring tests that need randomness (representative
/// selection) are reproducible.
pub fn test_rng() -> StdRng {
    StdRng::seed_from_u64(0xC0FFEE)
}

/// A [`Transport`] that records every frame it's asked to send instead of
/// touching a socket, so `SyncEngine`'s outbound calls (`sync_account`,
/// republishing backfilled blocks) can be asserted against in tests.
#[derive(Clone, Default)]
pub struct FakeTransport {
    sent: Arc<Mutex<Vec<Value>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().expect("fake transport mutex poisoned").clone()
    }
}

impl Transport for FakeTransport {
    fn send(&self, json: Value) -> Result<(), String> {
        self.sent.lock().expect("fake transport mutex poisoned").push(json);
        Ok(())
    }
}
