// Copyright (c) 2024 Lattice Wallet Contributors

//! Block authoring actions (spec §4.4): change-representative, buy-credit,
//! send, and receive all share one shape — load state under a read
//! transaction, validate against the invariants below, derive the new
//! block's fields, sign it, then hand it off to the caller for local
//! application and publication.

use displaydoc::Display;
use rand_core::{CryptoRng, RngCore};

use crate::{
    block::{
        constants::{credit_price, max_allowed_forks, MAX_ACCOUNT_CREDIT, TRANSACTIONS_PER_CREDIT},
        public_key_for, Block, BlockType, Opcode,
    },
    crypto::RawKey,
    db::models::{AccountId, AccountInfo, BlockHash, ReceivableInfo},
    error::WalletError,
};

#[derive(Display, Debug)]
pub enum AuthoringError {
    /// Wallet is locked
    WalletLocked,

    /// Block timestamp is out of the allowed skew window
    BlockTimestamp,

    /// Account has accumulated too many forks to author further blocks
    AccountLimited,

    /// Daily transaction credit budget exhausted
    AccountActionCredit,

    /// Requested credit delta would exceed the maximum account credit
    AccountMaxCredit,

    /// Insufficient balance for this action
    AccountActionBalance,

    /// Action attempted before the minimum post-receivable delay elapsed
    AccountActionTooQuickly,

    /// Receivable amount is smaller than the cost of opening an account
    ReceivableLessThanCredit,

    /// Unsupported block type for this action
    BlockType,
}

impl From<WalletError> for AuthoringError {
    fn from(src: WalletError) -> Self {
        match src {
            WalletError::WalletLocked => Self::WalletLocked,
            _ => Self::WalletLocked,
        }
    }
}

/// Everything an authoring action needs to read before it can compute the
/// new block's fields. Callers assemble this from the local ledger mirror
/// under a read transaction (spec §4.4 steps 1-3).
pub struct AuthoringContext {
    pub account: AccountId,
    pub account_info: Option<AccountInfo>,
    pub head: Option<Block>,
    pub block_type: BlockType,
    pub now: u64,
}

/// `AccountChange`: set a new representative (spec §4.4, CHANGE).
pub fn change(
    ctx: &AuthoringContext,
    private_key: &RawKey,
    representative: AccountId,
) -> Result<Block, AuthoringError> {
    let (info, head) = existing_account(ctx)?;
    let timestamp = next_timestamp(ctx.now, head.timestamp)?;
    check_forks(&info, timestamp)?;
    let counter = next_counter(head.counter, head.timestamp, timestamp, head.credit)?;

    let mut block = Block {
        block_type: ctx.block_type,
        opcode: Opcode::Change,
        credit: head.credit,
        counter,
        timestamp,
        height: head.height + 1,
        account: ctx.account,
        previous: head.head_hash(),
        representative,
        balance: head.balance,
        link: [0u8; 32],
        note: None,
        signature: [0u8; 64],
    };
    block.sign(private_key);
    Ok(block)
}

/// `AccountCredit`: purchase `delta` additional units of daily credit (spec
/// §4.4, CREDIT).
pub fn credit(
    ctx: &AuthoringContext,
    private_key: &RawKey,
    delta: u16,
) -> Result<Block, AuthoringError> {
    let (info, head) = existing_account(ctx)?;
    let timestamp = next_timestamp(ctx.now, head.timestamp)?;
    check_forks(&info, timestamp)?;
    let counter = next_counter(head.counter, head.timestamp, timestamp, head.credit)?;

    let new_credit = head.credit.checked_add(delta).unwrap_or(u16::MAX);
    if new_credit > MAX_ACCOUNT_CREDIT || delta >= MAX_ACCOUNT_CREDIT {
        return Err(AuthoringError::AccountMaxCredit);
    }
    let cost = credit_price(timestamp).saturating_mul(delta as u128);
    let balance = head
        .balance
        .checked_sub(cost)
        .ok_or(AuthoringError::AccountActionBalance)?;

    let mut block = Block {
        block_type: ctx.block_type,
        opcode: Opcode::Credit,
        credit: new_credit,
        counter,
        timestamp,
        height: head.height + 1,
        account: ctx.account,
        previous: head.head_hash(),
        representative: head.representative,
        balance,
        link: [0u8; 32],
        note: None,
        signature: [0u8; 64],
    };
    block.sign(private_key);
    Ok(block)
}

/// `AccountSend`: transfer `amount` to `destination` (spec §4.4, SEND).
pub fn send(
    ctx: &AuthoringContext,
    private_key: &RawKey,
    destination: AccountId,
    amount: u128,
) -> Result<Block, AuthoringError> {
    let (info, head) = existing_account(ctx)?;
    let timestamp = next_timestamp(ctx.now, head.timestamp)?;
    check_forks(&info, timestamp)?;
    let counter = next_counter(head.counter, head.timestamp, timestamp, head.credit)?;

    let balance = head
        .balance
        .checked_sub(amount)
        .ok_or(AuthoringError::AccountActionBalance)?;

    let mut block = Block {
        block_type: ctx.block_type,
        opcode: Opcode::Send,
        credit: head.credit,
        counter,
        timestamp,
        height: head.height + 1,
        account: ctx.account,
        previous: head.head_hash(),
        representative: head.representative,
        balance,
        link: destination.0,
        note: None,
        signature: [0u8; 64],
    };
    block.sign(private_key);
    Ok(block)
}

/// `AccountReceive`: consume a pending `Receivable`, either extending an
/// existing chain or opening a brand-new account (spec §4.4, RECEIVE).
pub fn receive<R: RngCore + CryptoRng>(
    ctx: &AuthoringContext,
    private_key: &RawKey,
    source_hash: BlockHash,
    receivable: &ReceivableInfo,
    preconfigured_reps: &[AccountId],
    rng: &mut R,
) -> Result<Block, AuthoringError> {
    match (&ctx.account_info, &ctx.head) {
        (Some(info), Some(head)) => {
            let timestamp = next_timestamp(ctx.now, head.timestamp)?;
            check_forks(info, timestamp)?;
            let counter = next_counter(head.counter, head.timestamp, timestamp, head.credit)?;
            let balance = head.balance.saturating_add(receivable.amount);

            let mut block = Block {
                block_type: ctx.block_type,
                opcode: Opcode::Receive,
                credit: head.credit,
                counter,
                timestamp,
                height: head.height + 1,
                account: ctx.account,
                previous: head.head_hash(),
                representative: head.representative,
                balance,
                link: source_hash.0,
                note: None,
                signature: [0u8; 64],
            };
            block.sign(private_key);
            Ok(block)
        }
        (None, None) => open_by_receive(
            ctx,
            private_key,
            source_hash,
            receivable,
            preconfigured_reps,
            rng,
        ),
        _ => Err(AuthoringError::BlockType),
    }
}

fn open_by_receive<R: RngCore + CryptoRng>(
    ctx: &AuthoringContext,
    private_key: &RawKey,
    source_hash: BlockHash,
    receivable: &ReceivableInfo,
    preconfigured_reps: &[AccountId],
    rng: &mut R,
) -> Result<Block, AuthoringError> {
    let cost = credit_price(ctx.now);
    if receivable.amount < cost {
        return Err(AuthoringError::ReceivableLessThanCredit);
    }
    let timestamp = ctx.now.max(receivable.timestamp + 1);
    if timestamp > ctx.now + crate::block::constants::MAX_TIMESTAMP_SKEW_SECS {
        return Err(AuthoringError::AccountActionTooQuickly);
    }

    let representative = pick_representative(preconfigured_reps, rng);

    let mut block = Block {
        block_type: ctx.block_type,
        opcode: Opcode::Receive,
        credit: 1,
        counter: 1,
        timestamp,
        height: 0,
        account: ctx.account,
        previous: BlockHash::ZERO,
        representative,
        balance: receivable.amount - cost,
        link: source_hash.0,
        note: None,
        signature: [0u8; 64],
    };
    block.sign(private_key);
    Ok(block)
}

/// Representative selection for opening RECEIVE (spec §4.5): uniform random
/// over the configured set, drawn from a cryptographically seeded RNG.
pub fn pick_representative<R: RngCore + CryptoRng>(
    preconfigured_reps: &[AccountId],
    rng: &mut R,
) -> AccountId {
    let idx = (rng.next_u32() as usize) % preconfigured_reps.len();
    preconfigured_reps[idx]
}

fn existing_account(ctx: &AuthoringContext) -> Result<(AccountInfo, &Block), AuthoringError> {
    let info = ctx.account_info.clone().ok_or(AuthoringError::BlockType)?;
    let head = ctx.head.as_ref().ok_or(AuthoringError::BlockType)?;
    Ok((info, head))
}

fn next_timestamp(now: u64, previous_timestamp: u64) -> Result<u64, AuthoringError> {
    let timestamp = now.max(previous_timestamp);
    if timestamp > now + crate::block::constants::MAX_TIMESTAMP_SKEW_SECS {
        return Err(AuthoringError::BlockTimestamp);
    }
    Ok(timestamp)
}

fn check_forks(info: &AccountInfo, timestamp: u64) -> Result<(), AuthoringError> {
    if info.forks > max_allowed_forks(timestamp) {
        return Err(AuthoringError::AccountLimited);
    }
    Ok(())
}

/// Same calendar day (UTC) as the previous block → increment; else reset to
/// 1. Enforces the daily credit budget either way (spec §4.4 step 6).
fn next_counter(
    previous_counter: u32,
    previous_timestamp: u64,
    timestamp: u64,
    credit: u16,
) -> Result<u32, AuthoringError> {
    const SECS_PER_DAY: u64 = 86_400;
    let counter = if timestamp / SECS_PER_DAY == previous_timestamp / SECS_PER_DAY {
        previous_counter + 1
    } else {
        1
    };
    let budget = credit as u32 * TRANSACTIONS_PER_CREDIT;
    if counter > budget {
        return Err(AuthoringError::AccountActionCredit);
    }
    Ok(counter)
}

impl Block {
    /// The hash a successor block must set as its `previous` field.
    fn head_hash(&self) -> BlockHash {
        self.content_hash()
    }
}

/// Derives the public key paired with `private_key`; re-exported here for
/// callers that only import the authoring module.
pub fn derive_public_key(private_key: &RawKey) -> AccountId {
    public_key_for(private_key)
}
