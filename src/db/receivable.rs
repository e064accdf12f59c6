// Copyright (c) 2024 Lattice Wallet Contributors

//! CRUD for the `receivable_info` table (spec §6). Keyed by
//! `(destination, source_hash)`; `lower_bound`/`upper_bound` give the
//! ordered-cursor access pattern spec §4.3 asks for, backed here by an
//! `ORDER BY source_hash` query rather than a hand-rolled cursor.

use diesel::prelude::*;

use crate::{
    db::{
        models::{AccountId, BlockHash, ReceivableInfo},
        schema::receivable_info,
        Conn,
    },
    error::LedgerDbError,
};

pub trait ReceivableInfoModel: Sized {
    fn get(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
    ) -> Result<Option<Self>, LedgerDbError>;
    fn put(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
        info: &Self,
    ) -> Result<(), LedgerDbError>;
    fn del(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
    ) -> Result<(), LedgerDbError>;
    /// All receivables for `destination`, ordered by `source_hash` ascending.
    fn lower_bound(
        conn: &mut Conn,
        destination: &AccountId,
    ) -> Result<Vec<(BlockHash, Self)>, LedgerDbError>;
    /// All receivables for `destination`, ordered by `source_hash` descending.
    fn upper_bound(
        conn: &mut Conn,
        destination: &AccountId,
    ) -> Result<Vec<(BlockHash, Self)>, LedgerDbError>;
}

impl ReceivableInfoModel for ReceivableInfo {
    fn get(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
    ) -> Result<Option<Self>, LedgerDbError> {
        use crate::db::schema::receivable_info::dsl;

        let row: Option<Vec<u8>> = dsl::receivable_info
            .filter(dsl::destination.eq(destination.to_hex()))
            .filter(dsl::source_hash.eq(source_hash.to_hex()))
            .select(dsl::value)
            .first(conn)
            .optional()?;
        row.map(|bytes| bincode::deserialize(&bytes).map_err(LedgerDbError::from))
            .transpose()
    }

    fn put(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
        info: &Self,
    ) -> Result<(), LedgerDbError> {
        let bytes = bincode::serialize(info)?;
        diesel::replace_into(receivable_info::table)
            .values((
                receivable_info::destination.eq(destination.to_hex()),
                receivable_info::source_hash.eq(source_hash.to_hex()),
                receivable_info::value.eq(bytes),
            ))
            .execute(conn)?;
        Ok(())
    }

    fn del(
        conn: &mut Conn,
        destination: &AccountId,
        source_hash: &BlockHash,
    ) -> Result<(), LedgerDbError> {
        use crate::db::schema::receivable_info::dsl;
        diesel::delete(
            dsl::receivable_info
                .filter(dsl::destination.eq(destination.to_hex()))
                .filter(dsl::source_hash.eq(source_hash.to_hex())),
        )
        .execute(conn)?;
        Ok(())
    }

    fn lower_bound(
        conn: &mut Conn,
        destination: &AccountId,
    ) -> Result<Vec<(BlockHash, Self)>, LedgerDbError> {
        use crate::db::schema::receivable_info::dsl;
        let rows: Vec<(String, Vec<u8>)> = dsl::receivable_info
            .filter(dsl::destination.eq(destination.to_hex()))
            .order(dsl::source_hash.asc())
            .select((dsl::source_hash, dsl::value))
            .load(conn)?;
        decode_rows(rows)
    }

    fn upper_bound(
        conn: &mut Conn,
        destination: &AccountId,
    ) -> Result<Vec<(BlockHash, Self)>, LedgerDbError> {
        use crate::db::schema::receivable_info::dsl;
        let rows: Vec<(String, Vec<u8>)> = dsl::receivable_info
            .filter(dsl::destination.eq(destination.to_hex()))
            .order(dsl::source_hash.desc())
            .select((dsl::source_hash, dsl::value))
            .load(conn)?;
        decode_rows(rows)
    }
}

fn decode_rows(
    rows: Vec<(String, Vec<u8>)>,
) -> Result<Vec<(BlockHash, ReceivableInfo)>, LedgerDbError> {
    rows.into_iter()
        .map(|(hash_hex, bytes)| {
            let hash = BlockHash::from_hex(&hash_hex)
                .ok_or_else(|| LedgerDbError::NotFound(hash_hex.clone()))?;
            let info: ReceivableInfo = bincode::deserialize(&bytes)?;
            Ok((hash, info))
        })
        .collect()
}
