use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{EMPTY_CODE_HASH, EMPTY_ROOT},
    crypto::{Address, Hash},
    serializer::{Reader, ReaderError, Serializer, Writer},
    utils::unix_day,
};

pub type Nonce = u64;

// Version tags for the persisted record forms. Decoding falls back from
// the canonical form to the slim and legacy layouts and re-encodes
// canonically on the next write.
const ACCOUNT_VERSION: u8 = 2;
const ACCOUNT_META_VERSION: u8 = 1;

// slim layout is exactly nonce + native balance
const SLIM_ACCOUNT_SIZE: usize = 8 + 32;

/// Canonical state account, stored under `keccak256(address)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub nonce: Nonce,
    pub balance_native: U256,
    pub storage_root: Hash,
    pub code_hash: Hash,
}

impl Account {
    pub fn new() -> Self {
        Account {
            nonce: 0,
            balance_native: U256::zero(),
            storage_root: EMPTY_ROOT,
            code_hash: EMPTY_CODE_HASH,
        }
    }

    pub fn is_contract(&self) -> bool {
        self.code_hash != EMPTY_CODE_HASH
    }
}

impl Default for Account {
    fn default() -> Self {
        Account::new()
    }
}

impl Serializer for Account {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(ACCOUNT_VERSION);
        writer.write_u64(&self.nonce);
        self.balance_native.write(writer);
        self.storage_root.write(writer);
        self.code_hash.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_u8()? != ACCOUNT_VERSION {
            return Err(ReaderError::InvalidValue);
        }
        Ok(Account {
            nonce: reader.read_u64()?,
            balance_native: U256::read(reader)?,
            storage_root: Hash::read(reader)?,
            code_hash: Hash::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        1 + 8 + 32 + 32 + 32
    }
}

/// Pending unbonding entry created by undelegate and consumed by claim
/// once `release_time` has passed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingUnbond {
    pub id: u64,
    pub validator: Address,
    pub amount: U256,
    pub release_time: u64,
}

impl Serializer for PendingUnbond {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.id);
        self.validator.write(writer);
        self.amount.write(writer);
        writer.write_u64(&self.release_time);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(PendingUnbond {
            id: reader.read_u64()?,
            validator: Address::read(reader)?,
            amount: U256::read(reader)?,
            release_time: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        8 + self.validator.size() + 32 + 8
    }
}

/// Engagement counters with a per-day rolling window
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCounters {
    pub score: u64,
    pub total_heartbeats: u64,
    pub last_heartbeat: u64,
    pub window_day: u64,
    pub window_count: u64,
}

impl EngagementCounters {
    /// Register a heartbeat, rolling the window when the unix day changes
    pub fn record_heartbeat(&mut self, timestamp: u64) {
        let day = unix_day(timestamp);
        if day != self.window_day {
            self.window_day = day;
            self.window_count = 0;
        }
        self.window_count += 1;
        self.total_heartbeats += 1;
        self.score = self.score.saturating_add(1);
        self.last_heartbeat = timestamp;
    }
}

impl Serializer for EngagementCounters {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.score);
        writer.write_u64(&self.total_heartbeats);
        writer.write_u64(&self.last_heartbeat);
        writer.write_u64(&self.window_day);
        writer.write_u64(&self.window_count);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(EngagementCounters {
            score: reader.read_u64()?,
            total_heartbeats: reader.read_u64()?,
            last_heartbeat: reader.read_u64()?,
            window_day: reader.read_u64()?,
            window_count: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        8 * 5
    }
}

/// Point-in-time view of an account's external lending position. The
/// lending module itself lives outside the node; only its snapshot is
/// carried in metadata.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LendingSnapshot {
    pub supplied: U256,
    pub borrowed: U256,
    pub collateral: U256,
    pub updated_at: u64,
}

impl Serializer for LendingSnapshot {
    fn write(&self, writer: &mut Writer) {
        self.supplied.write(writer);
        self.borrowed.write(writer);
        self.collateral.write(writer);
        writer.write_u64(&self.updated_at);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(LendingSnapshot {
            supplied: U256::read(reader)?,
            borrowed: U256::read(reader)?,
            collateral: U256::read(reader)?,
            updated_at: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        32 * 3 + 8
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("unknown unbonding entry {0}")]
    UnknownUnbond(u64),
    #[error("unbonding entry {id} releases at {release_time}")]
    UnbondLocked { id: u64, release_time: u64 },
    #[error("balance overflow")]
    Overflow,
}

/// Out-of-band account metadata, stored under
/// `keccak256("account-meta:" || address)`.
///
/// Invariant: `locked_secondary` equals the sum of all pending unbond
/// amounts; claiming an entry moves its amount to `balance_secondary`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountMeta {
    pub balance_secondary: U256,
    pub stake: U256,
    pub locked_secondary: U256,
    pub delegated_validator: Option<Address>,
    pub pending_unbonds: Vec<PendingUnbond>,
    pub unbonding_seq: u64,
    pub engagement: EngagementCounters,
    pub lending: Option<LendingSnapshot>,
    pub username: String,
}

impl AccountMeta {
    pub fn new() -> Self {
        AccountMeta::default()
    }

    /// Queue an unbonding entry; the caller has already reduced `stake`
    pub fn add_unbond(&mut self, validator: Address, amount: U256, release_time: u64) -> u64 {
        let id = self.unbonding_seq + 1;
        self.unbonding_seq = id;
        self.locked_secondary = self.locked_secondary.saturating_add(amount);
        self.pending_unbonds.push(PendingUnbond {
            id,
            validator,
            amount,
            release_time,
        });
        id
    }

    /// Consume a released unbonding entry, crediting the secondary balance
    pub fn claim_unbond(&mut self, id: u64, now: u64) -> Result<U256, AccountError> {
        let position = self
            .pending_unbonds
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(AccountError::UnknownUnbond(id))?;
        let release_time = self.pending_unbonds[position].release_time;
        if now < release_time {
            return Err(AccountError::UnbondLocked { id, release_time });
        }
        let entry = self.pending_unbonds.remove(position);
        self.locked_secondary = self
            .locked_secondary
            .checked_sub(entry.amount)
            .ok_or(AccountError::Overflow)?;
        self.balance_secondary = self
            .balance_secondary
            .checked_add(entry.amount)
            .ok_or(AccountError::Overflow)?;
        Ok(entry.amount)
    }
}

impl Serializer for AccountMeta {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(ACCOUNT_META_VERSION);
        self.balance_secondary.write(writer);
        self.stake.write(writer);
        self.locked_secondary.write(writer);
        self.delegated_validator.write(writer);
        self.pending_unbonds.write(writer);
        writer.write_u64(&self.unbonding_seq);
        self.engagement.write(writer);
        self.lending.write(writer);
        self.username.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_u8()? != ACCOUNT_META_VERSION {
            return Err(ReaderError::InvalidValue);
        }
        Ok(AccountMeta {
            balance_secondary: U256::read(reader)?,
            stake: U256::read(reader)?,
            locked_secondary: U256::read(reader)?,
            delegated_validator: Option::read(reader)?,
            pending_unbonds: Vec::read(reader)?,
            unbonding_seq: reader.read_u64()?,
            engagement: EngagementCounters::read(reader)?,
            lending: Option::read(reader)?,
            username: String::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        1 + 32 * 3
            + self.delegated_validator.size()
            + self.pending_unbonds.size()
            + 8
            + self.engagement.size()
            + self.lending.size()
            + self.username.size()
    }
}

/// Decode an account record with legacy fallbacks.
///
/// Order: canonical (versioned) → slim (nonce + native balance) → legacy
/// full record that still embedded metadata. Legacy decodes split the
/// embedded metadata out so the caller can persist both records in the
/// canonical layout; the fallback chain is deterministic and re-running
/// it over a re-encoded record yields the same result.
pub fn decode_account_record(bytes: &[u8]) -> Result<(Account, Option<AccountMeta>), ReaderError> {
    if let Ok(account) = Account::from_bytes(bytes) {
        return Ok((account, None));
    }

    if bytes.len() == SLIM_ACCOUNT_SIZE {
        log::debug!("slim account record, upgrading to canonical layout");
        let mut reader = Reader::new(bytes);
        let account = Account {
            nonce: reader.read_u64()?,
            balance_native: U256::read(&mut reader)?,
            storage_root: EMPTY_ROOT,
            code_hash: EMPTY_CODE_HASH,
        };
        return Ok((account, None));
    }

    decode_legacy_account(bytes)
}

// Pre-split layout: state fields followed by the metadata fields that now
// live in the out-of-band record.
fn decode_legacy_account(bytes: &[u8]) -> Result<(Account, Option<AccountMeta>), ReaderError> {
    let mut reader = Reader::new(bytes);
    let account = Account {
        nonce: reader.read_u64()?,
        balance_native: U256::read(&mut reader)?,
        storage_root: Hash::read(&mut reader)?,
        code_hash: Hash::read(&mut reader)?,
    };
    let mut meta = AccountMeta::new();
    meta.balance_secondary = U256::read(&mut reader)?;
    meta.stake = U256::read(&mut reader)?;
    meta.delegated_validator = Option::read(&mut reader)?;
    meta.username = String::read(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(ReaderError::TrailingBytes);
    }
    Ok((account, Some(meta)))
}
