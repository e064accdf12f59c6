// Copyright (c) 2024 Lattice Wallet Contributors

//! Command-line / environment configuration (SPEC_FULL.md Section D).
//! Grounded on the teacher's `config.rs`: a single `clap::Parser` struct
//! with `#[clap(long, env = "...")]` per field and `flatten`ed sub-configs,
//! plus a validation pass that turns missing-but-required combinations into
//! a single startup error rather than a panic deep in the core.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{block::BlockType, db::models::AccountId, error::CoreError};

fn parse_duration_secs(src: &str) -> Result<Duration, String> {
    let secs: u64 = src.parse().map_err(|_| format!("not a number of seconds: {src}"))?;
    Ok(Duration::from_secs(secs))
}

fn parse_account_id(src: &str) -> Result<AccountId, String> {
    AccountId::from_hex(src).ok_or_else(|| format!("not a 32-byte hex account id: {src}"))
}

fn parse_block_type(src: &str) -> Result<BlockType, String> {
    match src {
        "tx" | "tx_block" | "TxBlock" => Ok(BlockType::TxBlock),
        "ad" | "ad_block" | "AdBlock" => Ok(BlockType::AdBlock),
        other => Err(format!("unknown block type: {other} (expected \"tx\" or \"ad\")")),
    }
}

/// The remote node's WebSocket endpoint (spec §4.9).
#[derive(Clone, Debug, Parser)]
pub struct ServerConfig {
    /// Host of the remote sync node.
    #[clap(long, default_value = "127.0.0.1", env = "LATWALLET_SERVER_HOST")]
    pub host: String,

    /// Port of the remote sync node.
    #[clap(long, default_value = "7078", env = "LATWALLET_SERVER_PORT")]
    pub port: u16,

    /// WebSocket path on the remote sync node.
    #[clap(long, default_value = "/ws", env = "LATWALLET_SERVER_PATH")]
    pub path: String,

    /// Use `wss://` instead of `ws://`.
    #[clap(long, env = "LATWALLET_SERVER_TLS")]
    pub tls: bool,
}

impl ServerConfig {
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Top-level wallet core configuration (SPEC_FULL.md Section D).
#[derive(Clone, Debug, Parser)]
#[clap(name = "latwallet-core", about = "Light-client wallet core for a block-lattice ledger", version)]
pub struct CoreConfig {
    #[clap(flatten)]
    pub server: ServerConfig,

    /// Representative accounts to pick from when opening a new account by
    /// RECEIVE (spec §4.5). At least one is required.
    #[clap(long = "preconfigured-rep", value_parser = parse_account_id, required = true, num_args = 1.., env = "LATWALLET_PRECONFIGURED_REPS", value_delimiter = ',')]
    pub preconfigured_reps: Vec<AccountId>,

    /// Block kind this instance authors (spec §3, §6).
    #[clap(long, value_parser = parse_block_type, default_value = "tx", env = "LATWALLET_BLOCK_TYPE")]
    pub block_type: BlockType,

    /// Path to the local ledger mirror's SQLite file.
    #[clap(long, default_value = "latwallet.sqlite3", env = "LATWALLET_DB_PATH")]
    pub wallet_db_path: PathBuf,

    /// Interval between full sync cycles (spec §4.8 "every 300s").
    #[clap(long, default_value = "300", value_parser = parse_duration_secs, env = "LATWALLET_SYNC_INTERVAL")]
    pub sync_interval: Duration,

    /// Delay before attempting to reconnect the WebSocket transport (spec
    /// §4.9 "5-second periodic reconnect").
    #[clap(long, default_value = "5", value_parser = parse_duration_secs, env = "LATWALLET_RECONNECT_INTERVAL")]
    pub reconnect_interval: Duration,
}

impl CoreConfig {
    /// Parses argv/env and validates cross-field invariants that `clap`
    /// can't express directly (spec §6 "at least one preconfigured
    /// representative is required to open accounts by RECEIVE").
    pub fn load() -> Result<Self, CoreError> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.preconfigured_reps.is_empty() {
            return Err(CoreError::Fatal(
                "at least one --preconfigured-rep is required".to_string(),
            ));
        }
        Ok(())
    }
}
