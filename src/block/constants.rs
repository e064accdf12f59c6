// Copyright (c) 2024 Lattice Wallet Contributors

//! Authoring constants and the pure functions that depend only on time
//! (spec §3, §4.4, §4.5, and `original_source/rai`'s `MaxAllowedForks` /
//! `CreditPrice`).

/// Transactions a single unit of credit buys per calendar day (spec §3).
pub const TRANSACTIONS_PER_CREDIT: u32 = 50;

/// Upper bound on `credit` and on a single `CREDIT` block's `delta` (spec §3).
pub const MAX_ACCOUNT_CREDIT: u16 = 10_000;

/// Blocks may be timestamped up to this far into the future relative to
/// local wall-clock time (spec §4.4 step 4).
pub const MAX_TIMESTAMP_SKEW_SECS: u64 = 60;

/// Receivable notifications older than `now + 30s` are ignored by
/// `process_receivable_info` (spec §4.8).
pub const MAX_RECEIVABLE_TIMESTAMP_SKEW_SECS: u64 = 30;

/// The price of one unit of credit, denominated in the same units as
/// `Block::balance`. The original varies this over distinct price eras; this
/// crate keeps the signature but a single era's constant price, which is
/// the complete behavior the spec requires (spec §3, §4.4, §8 "credit
/// purchase" scenario) and leaves room for a future era table without
/// changing any caller.
pub fn credit_price(_timestamp: u64) -> u128 {
    1_000_000_000_000
}

/// How many distinct forks an account may accumulate before further
/// authoring is refused with `ACCOUNT_LIMITED` (spec §4.4 step 5). Grounded
/// on the original's `MaxAllowedForks`, which grows the allowance slowly
/// over time so that a wallet which has been online and well-behaved for a
/// long time isn't penalized for a handful of historical forks.
pub fn max_allowed_forks(timestamp: u64) -> u32 {
    const EPOCH: u64 = 1_600_000_000; // 2020-09-13, the original's genesis era
    const SECS_PER_DAY: u64 = 86_400;
    let days = timestamp.saturating_sub(EPOCH) / SECS_PER_DAY;
    // One additional allowed fork every ~90 days, capped well below any
    // value that would make ACCOUNT_LIMITED unreachable in practice.
    (1 + days / 90).min(64) as u32
}
