// Copyright (c) 2024 Lattice Wallet Contributors

//! Light-client wallet core for an account-based, block-lattice ledger:
//! encrypted HD key storage, block authoring, and WebSocket-based remote
//! sync, behind a single [`service::WalletCore`] facade.

pub mod block;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod logging;
pub mod observer;
pub mod queue;
pub mod service;
pub mod sync;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod util;
pub mod wallet;
pub mod ws;
