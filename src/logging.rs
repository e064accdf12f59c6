// Copyright (c) 2024 Lattice Wallet Contributors

//! Logger construction. `mc_common::logger` (the teacher's wrapper around
//! `slog`) is internal to MobileCoin and isn't part of this dependency
//! graph, so the same shape -- a long-lived `slog::Logger` threaded through
//! every constructor, static fields attached once at the root -- is rebuilt
//! directly on `slog`.

use slog::{o, Drain};

/// Builds the application's root logger: terminal-decorated, async-drained.
pub fn build_root_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// A logger that discards everything, for tests that don't want output noise.
#[cfg(test)]
pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, o!())
}
