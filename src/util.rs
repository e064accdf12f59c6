// Copyright (c) 2024 Lattice Wallet Contributors

//! Small shared helpers with no other natural home.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds, the `now` referenced throughout
/// spec §4.4/§4.8's timestamp checks.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}
