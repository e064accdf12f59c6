// Copyright (c) 2024 Lattice Wallet Contributors

//! CRUD for the `blocks` and `blocks_by_account_height` tables (spec §6).

use diesel::prelude::*;

use crate::{
    block::Block,
    db::{
        models::{AccountId, BlockHash},
        schema::{blocks, blocks_by_account_height},
        Conn,
    },
    error::LedgerDbError,
};

pub trait BlockModel: Sized {
    fn get(conn: &mut Conn, hash: &BlockHash) -> Result<Option<Self>, LedgerDbError>;
    fn put(conn: &mut Conn, block: &Self) -> Result<(), LedgerDbError>;
    fn del(conn: &mut Conn, hash: &BlockHash) -> Result<(), LedgerDbError>;
    fn exists(conn: &mut Conn, hash: &BlockHash) -> Result<bool, LedgerDbError>;
    fn get_by_account_height(
        conn: &mut Conn,
        account: &AccountId,
        height: u64,
    ) -> Result<Option<Self>, LedgerDbError>;
    fn successor_get(conn: &mut Conn, hash: &BlockHash) -> Result<Option<BlockHash>, LedgerDbError>;
    fn successor_set(
        conn: &mut Conn,
        hash: &BlockHash,
        successor: Option<&BlockHash>,
    ) -> Result<(), LedgerDbError>;
}

impl BlockModel for Block {
    fn get(conn: &mut Conn, hash: &BlockHash) -> Result<Option<Self>, LedgerDbError> {
        use crate::db::schema::blocks::dsl;

        let row: Option<Vec<u8>> = dsl::blocks
            .filter(dsl::hash.eq(hash.to_hex()))
            .select(dsl::value)
            .first(conn)
            .optional()?;
        row.map(|bytes| bincode::deserialize(&bytes).map_err(LedgerDbError::from))
            .transpose()
    }

    fn put(conn: &mut Conn, block: &Self) -> Result<(), LedgerDbError> {
        let hash = block.content_hash();
        let bytes = bincode::serialize(block)?;
        diesel::replace_into(blocks::table)
            .values((
                blocks::hash.eq(hash.to_hex()),
                blocks::value.eq(bytes),
                blocks::successor_hash.eq(None::<String>),
            ))
            .execute(conn)?;
        diesel::replace_into(blocks_by_account_height::table)
            .values((
                blocks_by_account_height::account.eq(block.account.to_hex()),
                blocks_by_account_height::height.eq(block.height as i64),
                blocks_by_account_height::hash.eq(hash.to_hex()),
            ))
            .execute(conn)?;
        Ok(())
    }

    fn del(conn: &mut Conn, hash: &BlockHash) -> Result<(), LedgerDbError> {
        // Need the block's (account, height) to remove the secondary index
        // entry too.
        if let Some(block) = Self::get(conn, hash)? {
            use crate::db::schema::blocks_by_account_height::dsl as bah;
            diesel::delete(
                bah::blocks_by_account_height
                    .filter(bah::account.eq(block.account.to_hex()))
                    .filter(bah::height.eq(block.height as i64)),
            )
            .execute(conn)?;
        }
        use crate::db::schema::blocks::dsl;
        diesel::delete(dsl::blocks.filter(dsl::hash.eq(hash.to_hex()))).execute(conn)?;
        Ok(())
    }

    fn exists(conn: &mut Conn, hash: &BlockHash) -> Result<bool, LedgerDbError> {
        use crate::db::schema::blocks::dsl;
        let count: i64 = dsl::blocks
            .filter(dsl::hash.eq(hash.to_hex()))
            .count()
            .get_result(conn)?;
        Ok(count > 0)
    }

    fn get_by_account_height(
        conn: &mut Conn,
        account: &AccountId,
        height: u64,
    ) -> Result<Option<Self>, LedgerDbError> {
        use crate::db::schema::blocks_by_account_height::dsl as bah;
        let hash_hex: Option<String> = bah::blocks_by_account_height
            .filter(bah::account.eq(account.to_hex()))
            .filter(bah::height.eq(height as i64))
            .select(bah::hash)
            .first(conn)
            .optional()?;
        match hash_hex {
            None => Ok(None),
            Some(hex) => {
                let hash = BlockHash::from_hex(&hex)
                    .ok_or_else(|| LedgerDbError::NotFound(hex.clone()))?;
                Self::get(conn, &hash)
            }
        }
    }

    fn successor_get(conn: &mut Conn, hash: &BlockHash) -> Result<Option<BlockHash>, LedgerDbError> {
        use crate::db::schema::blocks::dsl;
        let successor: Option<Option<String>> = dsl::blocks
            .filter(dsl::hash.eq(hash.to_hex()))
            .select(dsl::successor_hash)
            .first(conn)
            .optional()?;
        Ok(successor.flatten().and_then(|h| BlockHash::from_hex(&h)))
    }

    fn successor_set(
        conn: &mut Conn,
        hash: &BlockHash,
        successor: Option<&BlockHash>,
    ) -> Result<(), LedgerDbError> {
        use crate::db::schema::blocks::dsl;
        diesel::update(dsl::blocks.filter(dsl::hash.eq(hash.to_hex())))
            .set(dsl::successor_hash.eq(successor.map(|h| h.to_hex())))
            .execute(conn)?;
        Ok(())
    }
}
