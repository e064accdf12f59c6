// Copyright (c) 2024 Lattice Wallet Contributors

//! CRUD for the wallet-level tables: `wallet_info`, `wallet_account_info`,
//! `selected_wallet_id` (spec §6). These back the `Wallets` collection and
//! individual `Wallet`s, keyed by the small integer ids the core assigns,
//! not by account/block hash like the ledger-mirror tables.

use diesel::prelude::*;

use crate::{
    db::{
        models::{WalletAccountInfo, WalletInfo},
        schema::{selected_wallet_id, wallet_account_info, wallet_info},
        Conn,
    },
    error::LedgerDbError,
};

pub trait WalletInfoModel: Sized {
    fn get_all(conn: &mut Conn) -> Result<Vec<(u32, Self)>, LedgerDbError>;
    fn put(conn: &mut Conn, wallet_id: u32, info: &Self) -> Result<(), LedgerDbError>;
}

impl WalletInfoModel for WalletInfo {
    fn get_all(conn: &mut Conn) -> Result<Vec<(u32, Self)>, LedgerDbError> {
        use crate::db::schema::wallet_info::dsl;

        let rows: Vec<(i32, Vec<u8>)> = dsl::wallet_info.select((dsl::wallet_id, dsl::value)).load(conn)?;
        rows.into_iter()
            .map(|(wallet_id, bytes)| {
                let info: Self = bincode::deserialize(&bytes)?;
                Ok((wallet_id as u32, info))
            })
            .collect()
    }

    fn put(conn: &mut Conn, wallet_id: u32, info: &Self) -> Result<(), LedgerDbError> {
        let bytes = bincode::serialize(info)?;
        diesel::replace_into(wallet_info::table)
            .values((
                wallet_info::wallet_id.eq(wallet_id as i32),
                wallet_info::value.eq(bytes),
            ))
            .execute(conn)?;
        Ok(())
    }
}

pub trait WalletAccountInfoModel: Sized {
    /// All accounts belonging to `wallet_id`, keyed by their within-wallet
    /// account id.
    fn get_all(conn: &mut Conn, wallet_id: u32) -> Result<Vec<(u32, Self)>, LedgerDbError>;
    fn put(
        conn: &mut Conn,
        wallet_id: u32,
        account_id: u32,
        info: &Self,
    ) -> Result<(), LedgerDbError>;
}

impl WalletAccountInfoModel for WalletAccountInfo {
    fn get_all(conn: &mut Conn, wallet_id: u32) -> Result<Vec<(u32, Self)>, LedgerDbError> {
        use crate::db::schema::wallet_account_info::dsl;

        let rows: Vec<(i32, Vec<u8>)> = dsl::wallet_account_info
            .filter(dsl::wallet_id.eq(wallet_id as i32))
            .select((dsl::account_id, dsl::value))
            .load(conn)?;
        rows.into_iter()
            .map(|(account_id, bytes)| {
                let info: Self = bincode::deserialize(&bytes)?;
                Ok((account_id as u32, info))
            })
            .collect()
    }

    fn put(
        conn: &mut Conn,
        wallet_id: u32,
        account_id: u32,
        info: &Self,
    ) -> Result<(), LedgerDbError> {
        let bytes = bincode::serialize(info)?;
        diesel::replace_into(wallet_account_info::table)
            .values((
                wallet_account_info::wallet_id.eq(wallet_id as i32),
                wallet_account_info::account_id.eq(account_id as i32),
                wallet_account_info::value.eq(bytes),
            ))
            .execute(conn)?;
        Ok(())
    }
}

pub trait SelectedWalletIdModel {
    fn get(conn: &mut Conn) -> Result<Option<u32>, LedgerDbError>;
    fn put(conn: &mut Conn, wallet_id: u32) -> Result<(), LedgerDbError>;
}

/// Marker type; the table is a one-row singleton so there is no natural
/// struct to hang the trait off of the way the other tables have one.
pub struct SelectedWalletId;

impl SelectedWalletIdModel for SelectedWalletId {
    fn get(conn: &mut Conn) -> Result<Option<u32>, LedgerDbError> {
        use crate::db::schema::selected_wallet_id::dsl;

        let wallet_id: Option<i32> = dsl::selected_wallet_id
            .filter(dsl::singleton.eq(0))
            .select(dsl::wallet_id)
            .first(conn)
            .optional()?;
        Ok(wallet_id.map(|id| id as u32))
    }

    fn put(conn: &mut Conn, wallet_id: u32) -> Result<(), LedgerDbError> {
        diesel::replace_into(selected_wallet_id::table)
            .values((
                selected_wallet_id::singleton.eq(0),
                selected_wallet_id::wallet_id.eq(wallet_id as i32),
            ))
            .execute(conn)?;
        Ok(())
    }
}
