use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::MAX_FEE_BPS,
    crypto::Address,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// How a realm resolves disputes
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ArbitrationScheme {
    /// One designated arbitrator
    Single,
    /// M-of-N committee
    Committee,
}

impl Serializer for ArbitrationScheme {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            ArbitrationScheme::Single => 0,
            ArbitrationScheme::Committee => 1,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(ArbitrationScheme::Single),
            1 => Ok(ArbitrationScheme::Committee),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RealmConfigError {
    #[error("arbitrator set is empty")]
    EmptyMembers,
    #[error("threshold {threshold} out of range for {members} members")]
    ThresholdOutOfRange { threshold: u32, members: usize },
    #[error("single scheme requires exactly one member, got {0}")]
    SingleMemberCount(usize),
    #[error("fee bps {0} above maximum")]
    FeeBpsOutOfRange(u32),
}

/// Arbitrator allowlist with its signing threshold
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArbitratorSet {
    pub scheme: ArbitrationScheme,
    pub threshold: u32,
    pub members: IndexSet<Address>,
}

impl ArbitratorSet {
    pub fn validate(&self) -> Result<(), RealmConfigError> {
        if self.members.is_empty() {
            return Err(RealmConfigError::EmptyMembers);
        }
        if self.threshold == 0 || self.threshold as usize > self.members.len() {
            return Err(RealmConfigError::ThresholdOutOfRange {
                threshold: self.threshold,
                members: self.members.len(),
            });
        }
        if self.scheme == ArbitrationScheme::Single && self.members.len() != 1 {
            return Err(RealmConfigError::SingleMemberCount(self.members.len()));
        }
        Ok(())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }
}

impl Serializer for ArbitratorSet {
    fn write(&self, writer: &mut Writer) {
        self.scheme.write(writer);
        writer.write_u32(&self.threshold);
        self.members.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(ArbitratorSet {
            scheme: ArbitrationScheme::read(reader)?,
            threshold: reader.read_u32()?,
            members: IndexSet::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.scheme.size() + 4 + self.members.size()
    }
}

/// Optional fee schedule routed on arbitrated outcomes
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RealmFeeSchedule {
    pub fee_bps: u32,
    pub recipient: Address,
}

impl RealmFeeSchedule {
    pub fn validate(&self) -> Result<(), RealmConfigError> {
        if self.fee_bps > MAX_FEE_BPS {
            return Err(RealmConfigError::FeeBpsOutOfRange(self.fee_bps));
        }
        Ok(())
    }
}

impl Serializer for RealmFeeSchedule {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&self.fee_bps);
        self.recipient.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(RealmFeeSchedule {
            fee_bps: reader.read_u32()?,
            recipient: Address::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        4 + self.recipient.size()
    }
}

/// Descriptive realm fields, not interpreted by the engine
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RealmMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_profile: Option<String>,
    /// bech32 rendering of the fee recipient, kept for explorers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_recipient_bech32: Option<String>,
}

impl Serializer for RealmMetadata {
    fn write(&self, writer: &mut Writer) {
        self.scope.write(writer);
        self.provider_profile.write(writer);
        self.fee_recipient_bech32.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(RealmMetadata {
            scope: Option::read(reader)?,
            provider_profile: Option::read(reader)?,
            fee_recipient_bech32: Option::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.scope.size() + self.provider_profile.size() + self.fee_recipient_bech32.size()
    }
}

/// Arbitration policy captured into an escrow at creation. Immutable for
/// the life of the escrow; realm updates affect later escrows only.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrozenPolicy {
    pub realm_id: String,
    pub realm_version: u64,
    pub policy_nonce: u64,
    pub arbitrators: ArbitratorSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<RealmFeeSchedule>,
    pub metadata: RealmMetadata,
}

impl Serializer for FrozenPolicy {
    fn write(&self, writer: &mut Writer) {
        self.realm_id.write(writer);
        writer.write_u64(&self.realm_version);
        writer.write_u64(&self.policy_nonce);
        self.arbitrators.write(writer);
        self.fee.write(writer);
        self.metadata.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(FrozenPolicy {
            realm_id: String::read(reader)?,
            realm_version: reader.read_u64()?,
            policy_nonce: reader.read_u64()?,
            arbitrators: ArbitratorSet::read(reader)?,
            fee: Option::read(reader)?,
            metadata: RealmMetadata::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.realm_id.size()
            + 8
            + 8
            + self.arbitrators.size()
            + self.fee.size()
            + self.metadata.size()
    }
}

/// Governance-scoped arbitration realm. Versioned: policy updates bump
/// `version`; every freeze consumes one `next_policy_nonce`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    pub id: String,
    pub version: u64,
    pub next_policy_nonce: u64,
    pub arbitrators: ArbitratorSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<RealmFeeSchedule>,
    pub metadata: RealmMetadata,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Realm {
    pub fn validate(&self) -> Result<(), RealmConfigError> {
        self.arbitrators.validate()?;
        if let Some(fee) = &self.fee {
            fee.validate()?;
        }
        Ok(())
    }

    /// Capture the current policy into an escrow and consume a nonce
    pub fn freeze(&mut self) -> FrozenPolicy {
        let policy = FrozenPolicy {
            realm_id: self.id.clone(),
            realm_version: self.version,
            policy_nonce: self.next_policy_nonce,
            arbitrators: self.arbitrators.clone(),
            fee: self.fee.clone(),
            metadata: self.metadata.clone(),
        };
        self.next_policy_nonce += 1;
        policy
    }
}

impl Serializer for Realm {
    fn write(&self, writer: &mut Writer) {
        self.id.write(writer);
        writer.write_u64(&self.version);
        writer.write_u64(&self.next_policy_nonce);
        self.arbitrators.write(writer);
        self.fee.write(writer);
        self.metadata.write(writer);
        self.created_at.write(writer);
        self.updated_at.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Realm {
            id: String::read(reader)?,
            version: reader.read_u64()?,
            next_policy_nonce: reader.read_u64()?,
            arbitrators: ArbitratorSet::read(reader)?,
            fee: Option::read(reader)?,
            metadata: RealmMetadata::read(reader)?,
            created_at: i64::read(reader)?,
            updated_at: i64::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.id.size()
            + 8
            + 8
            + self.arbitrators.size()
            + self.fee.size()
            + self.metadata.size()
            + 8
            + 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee(threshold: u32, count: u8) -> ArbitratorSet {
        let members = (0..count)
            .map(|i| Address::new([i + 1; 20]))
            .collect::<IndexSet<_>>();
        ArbitratorSet {
            scheme: ArbitrationScheme::Committee,
            threshold,
            members,
        }
    }

    fn realm() -> Realm {
        Realm {
            id: "marketplace".into(),
            version: 1,
            next_policy_nonce: 1,
            arbitrators: committee(2, 3),
            fee: Some(RealmFeeSchedule {
                fee_bps: 120,
                recipient: Address::new([0xfe; 20]),
            }),
            metadata: RealmMetadata::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn freeze_consumes_policy_nonce() {
        let mut realm = realm();
        let first = realm.freeze();
        let second = realm.freeze();
        assert_eq!(first.policy_nonce, 1);
        assert_eq!(second.policy_nonce, 2);
        assert_eq!(realm.next_policy_nonce, 3);
        assert_eq!(first.realm_id, "marketplace");
        assert_eq!(first.arbitrators, realm.arbitrators);
    }

    #[test]
    fn frozen_policy_survives_realm_updates() {
        let mut realm = realm();
        let frozen = realm.freeze();
        realm.arbitrators = committee(1, 1);
        realm.arbitrators.scheme = ArbitrationScheme::Single;
        realm.version += 1;
        assert_eq!(frozen.realm_version, 1);
        assert_eq!(frozen.arbitrators.threshold, 2);
    }

    #[test]
    fn validation_rejects_bad_thresholds() {
        assert!(committee(0, 3).validate().is_err());
        assert!(committee(4, 3).validate().is_err());
        assert!(committee(2, 3).validate().is_ok());

        let mut single = committee(1, 2);
        single.scheme = ArbitrationScheme::Single;
        assert_eq!(
            single.validate(),
            Err(RealmConfigError::SingleMemberCount(2))
        );
    }

    #[test]
    fn realm_roundtrip() -> Result<(), ReaderError> {
        let realm = realm();
        let decoded = Realm::from_bytes(&realm.to_bytes())?;
        assert_eq!(decoded, realm);
        Ok(())
    }
}
