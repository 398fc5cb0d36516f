use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use nhb_common::{
    crypto::{sha256, Address, Hash, Signature},
    utils::canonical_json,
};

use super::SnapshotError;
use crate::core::validator::{GovernanceAnchor, ValidatorSet};

pub const MANIFEST_VERSION: u32 = 1;

/// Metadata for one exported chunk file
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub index: u32,
    pub path: String,
    pub entries: u64,
    pub bytes: u64,
    pub hash: Hash,
}

/// Validator attestation over the manifest digest
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSig {
    pub validator: Address,
    pub signature: Signature,
}

/// Governance-anchor attestation over the manifest digest
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSig {
    pub address: Address,
    pub signature: Signature,
}

/// Signed description of a state snapshot: totals, per-chunk hashes, and
/// the trust material. The digest is sha-256 over the canonical JSON of
/// the manifest with both signature fields cleared.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotManifest {
    pub version: u32,
    pub chain_id: u64,
    pub height: u64,
    pub state_root: Hash,
    pub chunk_size: u64,
    pub total_entries: u64,
    pub total_bytes: u64,
    pub chunks: Vec<ChunkMeta>,
    #[serde(default)]
    pub signatures: Vec<ValidatorSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceSig>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SnapshotManifest {
    /// Signing target for validators and the governance anchor
    pub fn digest(&self) -> Result<Hash, SnapshotError> {
        let mut unsigned = self.clone();
        unsigned.signatures = Vec::new();
        unsigned.governance = None;
        Ok(sha256(&canonical_json(&unsigned)?))
    }

    /// Trust rule: non-empty validator signatures must reach quorum
    /// under the current set; otherwise the governance anchor must
    /// verify. A manifest carrying neither is rejected.
    pub fn verify(
        &self,
        validators: Option<&ValidatorSet>,
        anchor: Option<&GovernanceAnchor>,
    ) -> Result<(), SnapshotError> {
        let digest = self.digest()?;
        if !self.signatures.is_empty() {
            let validators = validators.ok_or(SnapshotError::ManifestSignatureMissing)?;
            let signatures: Vec<Signature> = self
                .signatures
                .iter()
                .map(|sig| sig.signature.clone())
                .collect();
            validators.verify_quorum(&digest, &signatures)?;
            return Ok(());
        }
        if let Some(governance) = &self.governance {
            let anchor = anchor.ok_or(SnapshotError::InsufficientTrustRoot)?;
            anchor.verify(&digest, &governance.signature)?;
            return Ok(());
        }
        Err(SnapshotError::InsufficientTrustRoot)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nhb_common::crypto::{keccak256, KeyPair};

    fn manifest() -> SnapshotManifest {
        SnapshotManifest {
            version: MANIFEST_VERSION,
            chain_id: 187001,
            height: 10,
            state_root: keccak256(b"root"),
            chunk_size: 1024,
            total_entries: 3,
            total_bytes: 210,
            chunks: vec![ChunkMeta {
                index: 0,
                path: "chunk-000000.bin".into(),
                entries: 3,
                bytes: 210,
                hash: keccak256(b"chunk"),
            }],
            signatures: Vec::new(),
            governance: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn digest_ignores_signatures() -> Result<(), SnapshotError> {
        let keypair = KeyPair::from_secret(&[1u8; 32]).unwrap();
        let mut signed = manifest();
        let digest = signed.digest()?;
        signed.signatures.push(ValidatorSig {
            validator: keypair.address(),
            signature: keypair.sign(&digest),
        });
        assert_eq!(signed.digest()?, digest);
        Ok(())
    }

    #[test]
    fn digest_tracks_chunk_content() -> Result<(), SnapshotError> {
        let mut mutated = manifest();
        mutated.chunks[0].hash = keccak256(b"tampered");
        assert_ne!(manifest().digest()?, mutated.digest()?);
        Ok(())
    }

    #[test]
    fn quorum_signatures_verify() -> Result<(), SnapshotError> {
        let keypairs: Vec<KeyPair> = (1u8..=3)
            .map(|i| KeyPair::from_secret(&[i; 32]).unwrap())
            .collect();
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 10u64)));

        let mut signed = manifest();
        let digest = signed.digest()?;
        for keypair in &keypairs[..2] {
            signed.signatures.push(ValidatorSig {
                validator: keypair.address(),
                signature: keypair.sign(&digest),
            });
        }
        signed.verify(Some(&validators), None)
    }

    #[test]
    fn governance_anchor_is_the_fallback() -> Result<(), SnapshotError> {
        let keypair = KeyPair::from_secret(&[7u8; 32]).unwrap();
        let anchor = GovernanceAnchor::new(keypair.address());

        let mut signed = manifest();
        let digest = signed.digest()?;
        signed.governance = Some(GovernanceSig {
            address: keypair.address(),
            signature: keypair.sign(&digest),
        });
        signed.verify(None, Some(&anchor))
    }

    #[test]
    fn unsigned_manifest_is_rejected() {
        assert!(matches!(
            manifest().verify(None, None),
            Err(SnapshotError::InsufficientTrustRoot)
        ));
    }

    #[test]
    fn tampered_manifest_fails_quorum() -> Result<(), SnapshotError> {
        let keypair = KeyPair::from_secret(&[9u8; 32]).unwrap();
        let validators = ValidatorSet::from_entries([(keypair.address(), 1u64)]);

        let mut signed = manifest();
        let digest = signed.digest()?;
        signed.signatures.push(ValidatorSig {
            validator: keypair.address(),
            signature: keypair.sign(&digest),
        });
        signed.verify(Some(&validators), None)?;

        signed.height += 1;
        assert!(signed.verify(Some(&validators), None).is_err());
        Ok(())
    }
}
