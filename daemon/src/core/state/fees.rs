use std::collections::BTreeMap;

use chrono::{Datelike, TimeZone, Utc};
use primitive_types::U256;

use nhb_common::{
    config::BPS_DENOMINATOR,
    crypto::Address,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

use super::{fee_key, StateManager};
use crate::core::error::ChainError;

/// Per-domain merchant fee policy. The free tier rolls over monthly;
/// beyond it the domain's basis points apply.
#[derive(Clone, Debug)]
pub struct FeePolicy {
    pub version: u64,
    pub bps: u32,
    pub free_tier_tx_count: u64,
    pub owner_wallet: Address,
}

/// Fee domains plus the merchant → domain routing table
#[derive(Clone, Debug, Default)]
pub struct FeeConfig {
    pub domains: BTreeMap<String, FeePolicy>,
    pub merchant_domains: BTreeMap<Address, String>,
}

impl FeeConfig {
    pub fn domain_for(&self, merchant: &Address) -> Option<(&str, &FeePolicy)> {
        let domain = self.merchant_domains.get(merchant)?;
        let policy = self.domains.get(domain)?;
        Some((domain.as_str(), policy))
    }
}

/// Rolling usage counter persisted per (domain, merchant, window)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeeCounter {
    pub usage_count: u64,
    pub window_start: u64,
    pub policy_version: u64,
}

impl Serializer for FeeCounter {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.usage_count);
        writer.write_u64(&self.window_start);
        writer.write_u64(&self.policy_version);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(FeeCounter {
            usage_count: reader.read_u64()?,
            window_start: reader.read_u64()?,
            policy_version: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        8 * 3
    }
}

/// Outcome of assessing one payment against a fee domain
#[derive(Clone, Debug)]
pub struct FeeAssessment {
    pub domain: String,
    pub fee: U256,
    pub net: U256,
    pub effective_bps: u32,
    pub usage_count: u64,
    pub window_start: u64,
    pub policy_version: u64,
}

/// First instant of the UTC month containing `now`, the free-tier window
/// anchor
pub fn month_window_start(now: u64) -> u64 {
    let datetime = Utc
        .timestamp_opt(now as i64, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is valid"));
    let window = Utc
        .with_ymd_and_hms(datetime.year(), datetime.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is valid");
    window.timestamp() as u64
}

pub fn fee_for(gross: U256, bps: u32) -> Result<U256, ChainError> {
    gross
        .checked_mul(U256::from(bps))
        .map(|scaled| scaled / U256::from(BPS_DENOMINATOR))
        .ok_or(ChainError::BalanceOverflow)
}

/// Assess a merchant payment: rolls the monthly window, applies the free
/// tier, computes the fee with truncating division, and persists the
/// updated counter.
pub fn assess(
    state: &mut StateManager,
    merchant: &Address,
    config: &FeeConfig,
    gross: U256,
    now: u64,
) -> Result<Option<FeeAssessment>, ChainError> {
    let Some((domain, policy)) = config.domain_for(merchant) else {
        return Ok(None);
    };
    let window_start = month_window_start(now);
    let key = fee_key(domain, merchant, window_start);
    let mut counter: FeeCounter = state
        .raw_get(&key)?
        .map(|bytes| FeeCounter::from_bytes(&bytes))
        .transpose()?
        .unwrap_or_default();
    if counter.window_start != window_start {
        counter = FeeCounter {
            usage_count: 0,
            window_start,
            policy_version: policy.version,
        };
    }

    let effective_bps = if counter.usage_count < policy.free_tier_tx_count {
        0
    } else {
        policy.bps
    };
    let fee = fee_for(gross, effective_bps)?;
    let net = gross.checked_sub(fee).ok_or(ChainError::BalanceOverflow)?;

    counter.usage_count += 1;
    counter.policy_version = policy.version;
    state.raw_put(&key, counter.to_bytes())?;

    Ok(Some(FeeAssessment {
        domain: domain.to_string(),
        fee,
        net,
        effective_bps,
        usage_count: counter.usage_count,
        window_start,
        policy_version: policy.version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{storage::MemoryDatabase, trie::Trie};
    use std::sync::Arc;

    fn state() -> StateManager {
        StateManager::new(Trie::open(Arc::new(MemoryDatabase::new())).unwrap())
    }

    fn config(merchant: Address) -> FeeConfig {
        let mut config = FeeConfig::default();
        config.domains.insert(
            "pos".into(),
            FeePolicy {
                version: 1,
                bps: 150,
                free_tier_tx_count: 2,
                owner_wallet: Address::new([0xaa; 20]),
            },
        );
        config.merchant_domains.insert(merchant, "pos".into());
        config
    }

    #[test]
    fn free_tier_then_bps() -> Result<(), ChainError> {
        let mut state = state();
        let merchant = Address::new([5u8; 20]);
        let config = config(merchant);
        let gross = U256::from(10_000u64);

        for _ in 0..2 {
            let assessment = assess(&mut state, &merchant, &config, gross, 1_700_000_000)?
                .expect("domain configured");
            assert_eq!(assessment.effective_bps, 0);
            assert_eq!(assessment.fee, U256::zero());
        }

        let assessment = assess(&mut state, &merchant, &config, gross, 1_700_000_000)?
            .expect("domain configured");
        assert_eq!(assessment.effective_bps, 150);
        assert_eq!(assessment.fee, U256::from(150u64));
        assert_eq!(assessment.net, U256::from(9_850u64));
        assert_eq!(assessment.usage_count, 3);
        Ok(())
    }

    #[test]
    fn window_rolls_on_month_boundary() -> Result<(), ChainError> {
        let mut state = state();
        let merchant = Address::new([6u8; 20]);
        let config = config(merchant);
        let gross = U256::from(1_000u64);

        // exhaust the free tier in january
        let january = 1_704_067_200; // 2024-01-01
        for _ in 0..3 {
            assess(&mut state, &merchant, &config, gross, january)?;
        }
        let assessment = assess(&mut state, &merchant, &config, gross, january)?.unwrap();
        assert_eq!(assessment.effective_bps, 150);

        // february starts a fresh window
        let february = 1_706_745_600; // 2024-02-01
        let assessment = assess(&mut state, &merchant, &config, gross, february)?.unwrap();
        assert_eq!(assessment.effective_bps, 0);
        assert_eq!(assessment.usage_count, 1);
        Ok(())
    }

    #[test]
    fn unconfigured_merchant_pays_nothing() -> Result<(), ChainError> {
        let mut state = state();
        let merchant = Address::new([9u8; 20]);
        let config = FeeConfig::default();
        assert!(assess(&mut state, &merchant, &config, U256::from(5u64), 0)?.is_none());
        Ok(())
    }

    #[test]
    fn fee_division_truncates() -> Result<(), ChainError> {
        // 999 * 250 / 10000 = 24.975 → 24
        assert_eq!(fee_for(U256::from(999u64), 250)?, U256::from(24u64));
        Ok(())
    }

    #[test]
    fn month_window_start_is_first_of_month() {
        // 2024-03-17 12:00:00 → 2024-03-01 00:00:00
        assert_eq!(month_window_start(1_710_676_800), 1_709_251_200);
    }
}
