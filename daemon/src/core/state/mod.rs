mod applier;
mod traits;

pub(crate) mod fees;
pub(crate) mod intents;
pub(crate) mod quotas;

pub use applier::{ExecutionOutcome, ProcessorConfig, StateProcessor};
pub use fees::{FeeConfig, FeePolicy};
pub use quotas::{ModuleQuota, QuotaConfig};
pub use traits::{
    AccountState, BlockEnv, EscrowProvider, EscrowState, RealmProvider, TradeProvider, TradeState,
};

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use log::debug;
use primitive_types::U256;

use nhb_common::{
    account::{decode_account_record, Account, AccountMeta},
    config::{
        ACCOUNT_META_PREFIX, DEFAULT_MIN_VALIDATOR_STAKE, EPOCH_HISTORY_KEY, ESCROW_PREFIX,
        ESCROW_REALM_PREFIX, ESCROW_VAULT_PREFIX, FEES_PREFIX, INTENT_PREFIX, QUOTA_PREFIX,
        TRADE_PREFIX, REWARD_HISTORY_KEY, USERNAME_INDEX_KEY, VALIDATOR_ELIGIBLE_SET_KEY,
        VALIDATOR_SET_KEY,
    },
    crypto::{keccak256, keccak256_concat, Address, Hash},
    escrow::{Escrow, Realm, Token, Trade},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

use crate::core::{error::ChainError, trie::Trie};

lazy_static! {
    static ref USERNAME_INDEX: Hash = keccak256(USERNAME_INDEX_KEY);
    static ref VALIDATOR_SET: Hash = keccak256(VALIDATOR_SET_KEY);
    static ref VALIDATOR_ELIGIBLE: Hash = keccak256(VALIDATOR_ELIGIBLE_SET_KEY);
    static ref VALIDATOR_STAKES: Hash = keccak256(b"validator-stakes");
    static ref EPOCH_HISTORY: Hash = keccak256(EPOCH_HISTORY_KEY);
    static ref REWARD_HISTORY: Hash = keccak256(REWARD_HISTORY_KEY);
    static ref MIN_VALIDATOR_STAKE_PARAM: Hash = keccak256(b"param:min-validator-stake");
}

pub fn account_key(address: &Address) -> Hash {
    keccak256(address.as_bytes())
}

pub fn meta_key(address: &Address) -> Hash {
    keccak256_concat(&[ACCOUNT_META_PREFIX, address.as_bytes()])
}

pub fn escrow_key(id: &Hash) -> Hash {
    keccak256_concat(&[ESCROW_PREFIX, id.as_bytes()])
}

pub fn realm_key(id: &str) -> Hash {
    keccak256_concat(&[ESCROW_REALM_PREFIX, id.as_bytes()])
}

pub fn trade_key(id: &Hash) -> Hash {
    keccak256_concat(&[TRADE_PREFIX, id.as_bytes()])
}

pub fn trade_link_key(escrow_id: &Hash) -> Hash {
    keccak256_concat(&[b"trade-leg:", escrow_id.as_bytes()])
}

pub fn intent_key(reference: &Hash) -> Hash {
    keccak256_concat(&[INTENT_PREFIX, reference.as_bytes()])
}

pub fn quota_key(module: &str, epoch: u64) -> Hash {
    keccak256_concat(&[QUOTA_PREFIX, module.as_bytes(), &epoch.to_be_bytes()])
}

pub fn fee_key(domain: &str, merchant: &Address, window_start: u64) -> Hash {
    keccak256_concat(&[
        FEES_PREFIX,
        domain.as_bytes(),
        merchant.as_bytes(),
        &window_start.to_be_bytes(),
    ])
}

/// Pseudo-account custodying funded escrow value for one token
pub fn vault_address(token: Token) -> Address {
    let digest = keccak256_concat(&[ESCROW_VAULT_PREFIX, token.as_str().as_bytes()]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::new(bytes)
}

/// Username index entry; the index is kept sorted by username
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsernameEntry {
    pub username: String,
    pub address: Address,
}

impl Serializer for UsernameEntry {
    fn write(&self, writer: &mut Writer) {
        self.username.write(writer);
        self.address.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(UsernameEntry {
            username: String::read(reader)?,
            address: Address::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.username.size() + self.address.size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochEvent {
    pub height: u64,
    pub timestamp: u64,
    pub validators: Vec<Address>,
}

impl Serializer for EpochEvent {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.height);
        writer.write_u64(&self.timestamp);
        self.validators.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(EpochEvent {
            height: reader.read_u64()?,
            timestamp: reader.read_u64()?,
            validators: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + 8 + self.validators.size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardEvent {
    pub height: u64,
    pub address: Address,
    pub token: Token,
    pub amount: U256,
}

impl Serializer for RewardEvent {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.height);
        self.address.write(writer);
        self.token.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(RewardEvent {
            height: reader.read_u64()?,
            address: Address::read(reader)?,
            token: Token::read(reader)?,
            amount: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + self.address.size() + self.token.size() + 32
    }
}

/// Trie-backed state manager: the single default implementation of the
/// account/escrow/realm/trade provider capabilities, plus the secondary
/// indexes (usernames, validator sets, histories).
///
/// A write journal captures original values while a transaction executes
/// so a failed handler can be unwound without disturbing the staged
/// writes of earlier transactions in the same block.
pub struct StateManager {
    trie: Trie,
    journal: Option<HashMap<Hash, Option<Vec<u8>>>>,
}

impl StateManager {
    pub fn new(trie: Trie) -> Self {
        StateManager {
            trie,
            journal: None,
        }
    }

    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    pub fn root(&self) -> Hash {
        self.trie.hash()
    }

    pub fn commit(&mut self, height: u64) -> Result<Hash, ChainError> {
        self.trie.commit(height)
    }

    /// Reset staged state to the committed root, e.g. after a storage
    /// failure mid-block
    pub fn reset_to_committed(&mut self) -> Result<(), ChainError> {
        let root = self.trie.committed_hash();
        self.journal = None;
        self.trie.reset(&root)
    }

    // ===== Transaction journal =====

    pub fn begin_tx(&mut self) {
        self.journal = Some(HashMap::new());
    }

    pub fn commit_tx(&mut self) {
        self.journal = None;
    }

    pub fn rollback_tx(&mut self) -> Result<(), ChainError> {
        let Some(journal) = self.journal.take() else {
            return Ok(());
        };
        for (key, original) in journal {
            match original {
                Some(value) => self.trie.put(&key, value)?,
                None => self.trie.delete(&key)?,
            }
        }
        Ok(())
    }

    fn record_original(&mut self, key: &Hash) -> Result<(), ChainError> {
        let tracked = match self.journal.as_ref() {
            Some(journal) => journal.contains_key(key),
            None => return Ok(()),
        };
        if tracked {
            return Ok(());
        }
        let original = self.trie.get(key)?;
        if let Some(journal) = self.journal.as_mut() {
            journal.insert(key.clone(), original);
        }
        Ok(())
    }

    pub(crate) fn raw_get(&self, key: &Hash) -> Result<Option<Vec<u8>>, ChainError> {
        self.trie.get(key)
    }

    pub(crate) fn raw_put(&mut self, key: &Hash, value: Vec<u8>) -> Result<(), ChainError> {
        self.record_original(key)?;
        self.trie.put(key, value)
    }

    pub(crate) fn raw_delete(&mut self, key: &Hash) -> Result<(), ChainError> {
        self.record_original(key)?;
        self.trie.delete(key)
    }

    fn read_record<T: Serializer>(&self, key: &Hash) -> Result<Option<T>, ChainError> {
        match self.raw_get(key)? {
            Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_record<T: Serializer>(&mut self, key: &Hash, record: &T) -> Result<(), ChainError> {
        self.raw_put(key, record.to_bytes())
    }

    // ===== Username index =====

    pub fn username_index(&self) -> Result<Vec<UsernameEntry>, ChainError> {
        Ok(self.read_record(&USERNAME_INDEX)?.unwrap_or_default())
    }

    pub fn lookup_username(&self, username: &str) -> Result<Option<Address>, ChainError> {
        Ok(self
            .username_index()?
            .into_iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.address))
    }

    /// Point `address` at `username`, clearing any previous alias. The
    /// index stays sorted by username; collisions with another address
    /// are rejected.
    pub fn set_username(
        &mut self,
        address: &Address,
        username: Option<&str>,
    ) -> Result<(), ChainError> {
        let mut index = self.username_index()?;
        if let Some(username) = username {
            if let Some(existing) = index.iter().find(|entry| entry.username == username) {
                if existing.address != *address {
                    return Err(ChainError::UsernameTaken(username.to_string()));
                }
            }
        }
        index.retain(|entry| entry.address != *address);
        if let Some(username) = username {
            index.push(UsernameEntry {
                username: username.to_string(),
                address: *address,
            });
            index.sort_by(|a, b| a.username.cmp(&b.username));
        }
        self.write_record(&USERNAME_INDEX, &index)?;

        let mut meta = self.load_meta(address)?;
        meta.username = username.unwrap_or_default().to_string();
        self.store_meta(address, &meta)
    }

    // ===== Validator sets =====

    pub fn min_validator_stake(&self) -> Result<u64, ChainError> {
        Ok(self
            .read_record::<u64>(&MIN_VALIDATOR_STAKE_PARAM)?
            .unwrap_or(DEFAULT_MIN_VALIDATOR_STAKE))
    }

    pub fn set_min_validator_stake(&mut self, stake: u64) -> Result<(), ChainError> {
        self.write_record(&MIN_VALIDATOR_STAKE_PARAM, &stake)
    }

    pub fn validator_set(&self) -> Result<BTreeMap<Address, u64>, ChainError> {
        Ok(self.read_record(&VALIDATOR_SET)?.unwrap_or_default())
    }

    pub fn eligible_validator_set(&self) -> Result<BTreeMap<Address, u64>, ChainError> {
        Ok(self.read_record(&VALIDATOR_ELIGIBLE)?.unwrap_or_default())
    }

    fn validator_stakes(&self) -> Result<BTreeMap<Address, u64>, ChainError> {
        Ok(self.read_record(&VALIDATOR_STAKES)?.unwrap_or_default())
    }

    /// Apply a stake delta for a validator and maintain both sets.
    /// Crossing the minimum upward admits the validator to the eligible
    /// set (and the active set unless epoch rotation is enabled); any
    /// downward crossing prunes both sets eagerly. Returns true when the
    /// active set changed.
    pub fn apply_validator_stake_delta(
        &mut self,
        validator: &Address,
        delta: i128,
        epoch_rotation: bool,
    ) -> Result<bool, ChainError> {
        let min_stake = self.min_validator_stake()?;
        let mut stakes = self.validator_stakes()?;
        let current = stakes.get(validator).copied().unwrap_or(0) as i128;
        let updated = current + delta;
        let updated = if updated < 0 { 0 } else { updated as u64 };
        if updated == 0 {
            stakes.remove(validator);
        } else {
            stakes.insert(*validator, updated);
        }

        let mut eligible = self.eligible_validator_set()?;
        let mut active = self.validator_set()?;
        let was_eligible = eligible.contains_key(validator);
        let mut active_changed = false;

        if updated >= min_stake {
            eligible.insert(*validator, updated);
            let in_active = active.contains_key(validator);
            if in_active {
                active.insert(*validator, updated);
            } else if !epoch_rotation {
                active.insert(*validator, updated);
                active_changed = true;
            }
        } else if was_eligible {
            debug!("validator {} fell below minimum stake, pruning", validator);
            eligible.remove(validator);
            if active.remove(validator).is_some() {
                active_changed = true;
            }
        }

        self.write_record(&VALIDATOR_STAKES, &stakes)?;
        self.write_record(&VALIDATOR_ELIGIBLE, &eligible)?;
        self.write_record(&VALIDATOR_SET, &active)?;
        Ok(active_changed)
    }

    // ===== Histories =====

    pub fn epoch_history(&self) -> Result<Vec<EpochEvent>, ChainError> {
        Ok(self.read_record(&EPOCH_HISTORY)?.unwrap_or_default())
    }

    pub fn append_epoch_event(&mut self, event: EpochEvent) -> Result<(), ChainError> {
        let mut history = self.epoch_history()?;
        history.push(event);
        self.write_record(&EPOCH_HISTORY, &history)
    }

    pub fn reward_history(&self) -> Result<Vec<RewardEvent>, ChainError> {
        Ok(self.read_record(&REWARD_HISTORY)?.unwrap_or_default())
    }

    pub fn append_reward_event(&mut self, event: RewardEvent) -> Result<(), ChainError> {
        let mut history = self.reward_history()?;
        history.push(event);
        self.write_record(&REWARD_HISTORY, &history)
    }

    // ===== Typed records =====

    fn load_account(&mut self, address: &Address) -> Result<Account, ChainError> {
        let key = account_key(address);
        let Some(bytes) = self.raw_get(&key)? else {
            return Ok(Account::new());
        };
        let (account, migrated_meta) = decode_account_record(&bytes)?;
        // legacy layouts are rewritten canonically on first read
        let canonical = account.to_bytes();
        if canonical != bytes {
            debug!("migrating legacy account record for {}", address);
            self.raw_put(&key, canonical)?;
        }
        if let Some(meta) = migrated_meta {
            let meta_key = meta_key(address);
            if self.raw_get(&meta_key)?.is_none() {
                self.raw_put(&meta_key, meta.to_bytes())?;
            }
        }
        Ok(account)
    }

    fn store_account(&mut self, address: &Address, account: &Account) -> Result<(), ChainError> {
        self.raw_put(&account_key(address), account.to_bytes())
    }

    fn load_meta(&mut self, address: &Address) -> Result<AccountMeta, ChainError> {
        match self.raw_get(&meta_key(address))? {
            Some(bytes) => Ok(AccountMeta::from_bytes(&bytes)?),
            None => Ok(AccountMeta::new()),
        }
    }

    fn store_meta(&mut self, address: &Address, meta: &AccountMeta) -> Result<(), ChainError> {
        self.raw_put(&meta_key(address), meta.to_bytes())
    }
}

impl AccountState for StateManager {
    fn get_account(&mut self, address: &Address) -> Result<Account, ChainError> {
        self.load_account(address)
    }

    fn set_account(&mut self, address: &Address, account: &Account) -> Result<(), ChainError> {
        self.store_account(address, account)
    }

    fn get_meta(&mut self, address: &Address) -> Result<AccountMeta, ChainError> {
        self.load_meta(address)
    }

    fn set_meta(&mut self, address: &Address, meta: &AccountMeta) -> Result<(), ChainError> {
        self.store_meta(address, meta)
    }
}

impl EscrowProvider for StateManager {
    fn get_escrow(&mut self, id: &Hash) -> Result<Option<Escrow>, ChainError> {
        match self.raw_get(&escrow_key(id))? {
            Some(bytes) => Ok(Some(Escrow::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_escrow(&mut self, escrow: &Escrow) -> Result<(), ChainError> {
        self.raw_put(&escrow_key(&escrow.id), escrow.to_bytes())
    }
}

impl RealmProvider for StateManager {
    fn get_realm(&mut self, id: &str) -> Result<Option<Realm>, ChainError> {
        match self.raw_get(&realm_key(id))? {
            Some(bytes) => Ok(Some(Realm::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_realm(&mut self, realm: &Realm) -> Result<(), ChainError> {
        self.raw_put(&realm_key(&realm.id), realm.to_bytes())
    }
}

impl TradeProvider for StateManager {
    fn get_trade(&mut self, id: &Hash) -> Result<Option<Trade>, ChainError> {
        match self.raw_get(&trade_key(id))? {
            Some(bytes) => Ok(Some(Trade::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_trade(&mut self, trade: &Trade) -> Result<(), ChainError> {
        self.raw_put(&trade_key(&trade.id), trade.to_bytes())
    }

    fn trade_for_escrow(&mut self, escrow_id: &Hash) -> Result<Option<Hash>, ChainError> {
        match self.raw_get(&trade_link_key(escrow_id))? {
            Some(bytes) => Ok(Some(Hash::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn link_escrow(&mut self, escrow_id: &Hash, trade_id: &Hash) -> Result<(), ChainError> {
        self.raw_put(&trade_link_key(escrow_id), trade_id.as_bytes().to_vec())
    }
}
