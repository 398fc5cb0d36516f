use serde::{Deserialize, Deserializer, Serialize, Serializer as SerdeSerializer};

use crate::crypto::{keccak256, Hash};

/// Outcome requested by an arbitration decision
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Release,
    Refund,
}

fn serialize_hash_prefixed<S: SerdeSerializer>(
    hash: &Hash,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash.to_hex_prefixed())
}

fn serialize_opt_hash_prefixed<S: SerdeSerializer>(
    hash: &Option<Hash>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match hash {
        Some(hash) => serializer.serialize_str(&hash.to_hex_prefixed()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_hash<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
    let hex = String::deserialize(deserializer)?;
    hex.parse().map_err(serde::de::Error::custom)
}

fn deserialize_opt_hash<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Hash>, D::Error> {
    let hex: Option<String> = Option::deserialize(deserializer)?;
    match hex {
        Some(hex) => Ok(Some(hex.parse().map_err(serde::de::Error::custom)?)),
        None => Ok(None),
    }
}

/// Signed dispute-resolution payload. Arbitrators sign the keccak-256 of
/// the exact canonical JSON bytes submitted on chain; the engine hashes
/// the same bytes, so no re-canonicalization can diverge between signer
/// and verifier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecisionPayload {
    #[serde(
        serialize_with = "serialize_hash_prefixed",
        deserialize_with = "deserialize_hash"
    )]
    pub escrow_id: Hash,
    pub outcome: DecisionOutcome,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_hash_prefixed",
        deserialize_with = "deserialize_opt_hash"
    )]
    pub metadata: Option<Hash>,
    pub policy_nonce: u64,
}

impl DecisionPayload {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        crate::utils::canonical_json(self)
    }

    /// Digest arbitrators sign: keccak-256 over the payload bytes
    pub fn digest(bytes: &[u8]) -> Hash {
        keccak256(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_json_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let payload = DecisionPayload {
            escrow_id: keccak256(b"escrow"),
            outcome: DecisionOutcome::Release,
            metadata: None,
            policy_nonce: 1,
        };
        let bytes = payload.to_canonical_json()?;
        let text = String::from_utf8(bytes.clone())?;
        assert!(text.contains(r#""outcome":"release""#));
        assert!(text.contains("0x"));
        let decoded = DecisionPayload::from_json(&bytes)?;
        assert_eq!(decoded, payload);
        Ok(())
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = DecisionPayload::from_json(
            br#"{"escrowId":"0x0000000000000000000000000000000000000000000000000000000000000000","outcome":"refund","policyNonce":1,"extra":true}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn digest_is_over_exact_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let payload = DecisionPayload {
            escrow_id: Hash::zero(),
            outcome: DecisionOutcome::Refund,
            metadata: Some(Hash::max()),
            policy_nonce: 3,
        };
        let bytes = payload.to_canonical_json()?;
        let digest = DecisionPayload::digest(&bytes);
        let mut tampered = bytes.clone();
        let last = tampered.len() - 2;
        tampered[last] ^= 1;
        assert_ne!(digest, DecisionPayload::digest(&tampered));
        Ok(())
    }
}
