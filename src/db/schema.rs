// Copyright (c) 2024 Lattice Wallet Contributors

//! Diesel table declarations for the local ledger mirror (spec §6). Each
//! table is a plain key/value map with a `bincode`-encoded `BLOB` payload,
//! following the teacher's `db/schema.rs` shape (one `table!` per logical
//! entity) even though the payloads here are opaque blobs rather than
//! column-per-field rows.

diesel::table! {
    wallet_info (wallet_id) {
        wallet_id -> Integer,
        value -> Binary,
    }
}

diesel::table! {
    wallet_account_info (wallet_id, account_id) {
        wallet_id -> Integer,
        account_id -> Integer,
        value -> Binary,
    }
}

diesel::table! {
    selected_wallet_id (singleton) {
        singleton -> Integer,
        wallet_id -> Integer,
    }
}

diesel::table! {
    account_info (account) {
        account -> Text,
        value -> Binary,
    }
}

diesel::table! {
    blocks (hash) {
        hash -> Text,
        value -> Binary,
        successor_hash -> Nullable<Text>,
    }
}

diesel::table! {
    blocks_by_account_height (account, height) {
        account -> Text,
        height -> BigInt,
        hash -> Text,
    }
}

diesel::table! {
    receivable_info (destination, source_hash) {
        destination -> Text,
        source_hash -> Text,
        value -> Binary,
    }
}

diesel::table! {
    rollback_blocks (hash) {
        hash -> Text,
        value -> Binary,
    }
}
