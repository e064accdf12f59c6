// Copyright (c) 2024 Lattice Wallet Contributors

//! CRUD for the `account_info` table (spec §6).

use diesel::prelude::*;

use crate::{
    db::{models::AccountId, schema::account_info, Conn},
    error::LedgerDbError,
};

pub use crate::db::models::AccountInfo;

pub trait AccountInfoModel: Sized {
    fn get(conn: &mut Conn, account: &AccountId) -> Result<Option<Self>, LedgerDbError>;
    fn put(conn: &mut Conn, account: &AccountId, info: &Self) -> Result<(), LedgerDbError>;
    fn del(conn: &mut Conn, account: &AccountId) -> Result<(), LedgerDbError>;
    /// All owned accounts' info, in no particular order (spec §6
    /// `account_info_begin/end`).
    fn all(conn: &mut Conn) -> Result<Vec<(AccountId, Self)>, LedgerDbError>;
}

impl AccountInfoModel for AccountInfo {
    fn get(conn: &mut Conn, account: &AccountId) -> Result<Option<Self>, LedgerDbError> {
        use crate::db::schema::account_info::dsl;

        let row: Option<Vec<u8>> = dsl::account_info
            .filter(dsl::account.eq(account.to_hex()))
            .select(dsl::value)
            .first(conn)
            .optional()?;
        row.map(|bytes| bincode::deserialize(&bytes).map_err(LedgerDbError::from))
            .transpose()
    }

    fn put(conn: &mut Conn, account: &AccountId, info: &Self) -> Result<(), LedgerDbError> {
        let bytes = bincode::serialize(info)?;
        diesel::replace_into(account_info::table)
            .values((
                account_info::account.eq(account.to_hex()),
                account_info::value.eq(bytes),
            ))
            .execute(conn)?;
        Ok(())
    }

    fn del(conn: &mut Conn, account: &AccountId) -> Result<(), LedgerDbError> {
        use crate::db::schema::account_info::dsl;
        diesel::delete(dsl::account_info.filter(dsl::account.eq(account.to_hex()))).execute(conn)?;
        Ok(())
    }

    fn all(conn: &mut Conn) -> Result<Vec<(AccountId, Self)>, LedgerDbError> {
        use crate::db::schema::account_info::dsl;

        let rows: Vec<(String, Vec<u8>)> = dsl::account_info
            .select((dsl::account, dsl::value))
            .load(conn)?;
        rows.into_iter()
            .map(|(account_hex, bytes)| {
                let account = AccountId::from_hex(&account_hex)
                    .ok_or_else(|| LedgerDbError::NotFound(account_hex.clone()))?;
                let info: Self = bincode::deserialize(&bytes)?;
                Ok((account, info))
            })
            .collect()
    }
}
