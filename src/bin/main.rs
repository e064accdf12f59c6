// Copyright (c) 2024 Lattice Wallet Contributors

//! Entry point for the wallet core daemon. Grounded on the teacher's
//! `full-service/src/bin/main.rs`: load environment, parse config, build a
//! logger, construct the top-level service, then block forever. The
//! rocket/HTTP surface and MobileCoin-consensus-specific setup (sentry
//! guard, peer manager, ledger sync thread) don't apply here; what remains
//! is the same "parse config or die, then run" shape.

use latwallet_core::{config::CoreConfig, logging, service::WalletCore};
use slog::{error, info};

fn main() {
    dotenv::dotenv().ok();

    let logger = logging::build_root_logger();

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(logger, "failed to load configuration"; "error" => format!("{e}"));
            std::process::exit(1);
        }
    };

    info!(logger, "starting latwallet-core"; "server" => config.server.url());

    let core = match WalletCore::start(config, logger.clone()) {
        Ok(core) => core,
        Err(e) => {
            error!(logger, "failed to start wallet core"; "error" => format!("{e}"));
            std::process::exit(1);
        }
    };

    info!(logger, "wallet core running");

    // The action worker, sync engine, and WebSocket runner each own their
    // own thread; the main thread just keeps the process alive. `core` is
    // dropped without `core.stop()` on a hard kill, same as the teacher's
    // `main`, which never calls a graceful shutdown path either.
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
