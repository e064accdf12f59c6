// Copyright (c) 2024 Lattice Wallet Contributors

//! CRUD for the `rollback_blocks` archive (spec §6, §8 invariant 9). Blocks
//! are only ever copied in here on their way out of `blocks`; the archive is
//! never pruned by this crate.

use diesel::prelude::*;

use crate::{
    block::Block,
    db::{models::BlockHash, schema::rollback_blocks, Conn},
    error::LedgerDbError,
};

pub trait RollbackBlockModel: Sized {
    fn put(conn: &mut Conn, block: &Self) -> Result<(), LedgerDbError>;
}

impl RollbackBlockModel for Block {
    fn put(conn: &mut Conn, block: &Self) -> Result<(), LedgerDbError> {
        let hash: BlockHash = block.content_hash();
        let bytes = bincode::serialize(block)?;
        diesel::replace_into(rollback_blocks::table)
            .values((
                rollback_blocks::hash.eq(hash.to_hex()),
                rollback_blocks::value.eq(bytes),
            ))
            .execute(conn)?;
        Ok(())
    }
}
