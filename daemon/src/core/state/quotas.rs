use std::collections::BTreeMap;

use log::trace;
use primitive_types::U256;

use nhb_common::serializer::{Reader, ReaderError, Serializer, Writer};

use super::{quota_key, StateManager};
use crate::{config::DEFAULT_QUOTA_EPOCH_SECS, core::error::ChainError};

/// Rate limits for one module within its epoch window
#[derive(Clone, Debug)]
pub struct ModuleQuota {
    pub max_requests_per_epoch: u64,
    pub max_value_per_epoch: U256,
    pub epoch_seconds: u64,
}

impl Default for ModuleQuota {
    fn default() -> Self {
        ModuleQuota {
            max_requests_per_epoch: u64::MAX,
            max_value_per_epoch: U256::MAX,
            epoch_seconds: DEFAULT_QUOTA_EPOCH_SECS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct QuotaConfig {
    pub modules: BTreeMap<String, ModuleQuota>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct QuotaCounter {
    requests: u64,
    value: U256,
}

impl Serializer for QuotaCounter {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.requests);
        self.value.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(QuotaCounter {
            requests: reader.read_u64()?,
            value: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + 32
    }
}

/// Outcome carried to the `QuotaExceeded` event on failure
#[derive(Clone, Debug)]
pub struct QuotaBreach {
    pub module: String,
    pub epoch: u64,
    pub requests: u64,
    pub value: U256,
}

/// Charge one request of `value` against the module's quota for the
/// current epoch. Counters for epochs older than the previous one are
/// pruned opportunistically.
pub fn charge(
    state: &mut StateManager,
    config: &QuotaConfig,
    module: &str,
    value: U256,
    now: u64,
) -> Result<Result<(), QuotaBreach>, ChainError> {
    let Some(quota) = config.modules.get(module) else {
        return Ok(Ok(()));
    };
    let epoch = now / quota.epoch_seconds.max(1);
    let key = quota_key(module, epoch);
    let mut counter: QuotaCounter = state
        .raw_get(&key)?
        .map(|bytes| QuotaCounter::from_bytes(&bytes))
        .transpose()?
        .unwrap_or_default();

    counter.requests += 1;
    counter.value = counter
        .value
        .checked_add(value)
        .ok_or(ChainError::BalanceOverflow)?;

    if counter.requests > quota.max_requests_per_epoch || counter.value > quota.max_value_per_epoch
    {
        return Ok(Err(QuotaBreach {
            module: module.to_string(),
            epoch,
            requests: counter.requests,
            value: counter.value,
        }));
    }

    state.raw_put(&key, counter.to_bytes())?;

    // drop the counter from two epochs ago, nothing reads it anymore
    if epoch >= 2 {
        let stale = quota_key(module, epoch - 2);
        if state.raw_get(&stale)?.is_some() {
            trace!("pruning stale quota counter for {} epoch {}", module, epoch - 2);
            state.raw_delete(&stale)?;
        }
    }
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{storage::MemoryDatabase, trie::Trie};
    use std::sync::Arc;

    fn state() -> StateManager {
        StateManager::new(Trie::open(Arc::new(MemoryDatabase::new())).unwrap())
    }

    fn config() -> QuotaConfig {
        let mut config = QuotaConfig::default();
        config.modules.insert(
            "escrow".into(),
            ModuleQuota {
                max_requests_per_epoch: 2,
                max_value_per_epoch: U256::from(100u64),
                epoch_seconds: 60,
            },
        );
        config
    }

    #[test]
    fn request_limit_enforced() -> Result<(), ChainError> {
        let mut state = state();
        let config = config();
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 0)?.is_ok());
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 1)?.is_ok());
        let breach = charge(&mut state, &config, "escrow", U256::from(1u64), 2)?;
        assert!(breach.is_err());
        let breach = breach.unwrap_err();
        assert_eq!(breach.requests, 3);
        Ok(())
    }

    #[test]
    fn value_limit_enforced() -> Result<(), ChainError> {
        let mut state = state();
        let config = config();
        assert!(charge(&mut state, &config, "escrow", U256::from(90u64), 0)?.is_ok());
        assert!(charge(&mut state, &config, "escrow", U256::from(20u64), 1)?.is_err());
        Ok(())
    }

    #[test]
    fn epochs_are_independent() -> Result<(), ChainError> {
        let mut state = state();
        let config = config();
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 0)?.is_ok());
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 10)?.is_ok());
        // next epoch starts at 60s
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 61)?.is_ok());
        assert!(charge(&mut state, &config, "escrow", U256::from(1u64), 62)?.is_ok());
        Ok(())
    }

    #[test]
    fn unconfigured_module_is_unlimited() -> Result<(), ChainError> {
        let mut state = state();
        let config = QuotaConfig::default();
        for i in 0..100 {
            assert!(charge(&mut state, &config, "transfer", U256::from(1u64), i)?.is_ok());
        }
        Ok(())
    }
}
