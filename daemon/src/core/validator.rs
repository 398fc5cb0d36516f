use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use nhb_common::crypto::{Address, Hash, Signature};

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("malformed signature at index {0}")]
    SignatureFormat(usize),
    #[error("recovered signer {0} is not a known validator")]
    UnknownSigner(Address),
    #[error("quorum insufficient: signed power {signed} of total {total}")]
    QuorumInsufficient { signed: u64, total: u64 },
    #[error("governance signature does not recover to anchor {0}")]
    GovernanceSignatureInvalid(Address),
    #[error("no validator signatures and no governance anchor")]
    InsufficientTrustRoot,
}

/// Weighted validator set. Iteration order is deterministic so quorum
/// accounting and serialized forms are stable across nodes.
#[derive(Clone, Debug, Default)]
pub struct ValidatorSet {
    powers: IndexMap<Address, u64>,
}

impl ValidatorSet {
    pub fn new(powers: IndexMap<Address, u64>) -> Self {
        ValidatorSet { powers }
    }

    pub fn from_entries<I: IntoIterator<Item = (Address, u64)>>(entries: I) -> Self {
        ValidatorSet {
            powers: entries.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.powers.len()
    }

    pub fn power_of(&self, validator: &Address) -> Option<u64> {
        self.powers.get(validator).copied()
    }

    pub fn total_power(&self) -> u64 {
        self.powers.values().fold(0u64, |acc, p| acc.saturating_add(*p))
    }

    /// Verify a ≥2/3 validator-weight quorum over `digest`.
    ///
    /// Signatures are recovered to addresses; unknown signers fail the
    /// check, duplicate signers are counted once. The threshold is
    /// inclusive: `signed * 3 >= total * 2`.
    pub fn verify_quorum(
        &self,
        digest: &Hash,
        signatures: &[Signature],
    ) -> Result<(), QuorumError> {
        let total = self.total_power();
        let mut seen: HashSet<Address> = HashSet::new();
        let mut signed: u64 = 0;

        for (index, signature) in signatures.iter().enumerate() {
            let signer = signature
                .recover(digest)
                .map_err(|_| QuorumError::SignatureFormat(index))?;
            let Some(power) = self.power_of(&signer) else {
                return Err(QuorumError::UnknownSigner(signer));
            };
            if seen.insert(signer) {
                signed = signed.saturating_add(power);
            }
        }

        if (signed as u128) * 3 < (total as u128) * 2 {
            debug!(
                "quorum check failed: signed {} of {} ({} distinct signers)",
                signed,
                total,
                seen.len()
            );
            return Err(QuorumError::QuorumInsufficient { signed, total });
        }
        Ok(())
    }
}

/// Single-key trust root usable instead of a validator quorum, e.g. for
/// genesis snapshot manifests before the validator set exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovernanceAnchor {
    pub address: Address,
}

impl GovernanceAnchor {
    pub fn new(address: Address) -> Self {
        GovernanceAnchor { address }
    }

    pub fn verify(&self, digest: &Hash, signature: &Signature) -> Result<(), QuorumError> {
        let signer = signature
            .recover(digest)
            .map_err(|_| QuorumError::GovernanceSignatureInvalid(self.address))?;
        if signer != self.address {
            return Err(QuorumError::GovernanceSignatureInvalid(self.address));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nhb_common::crypto::{keccak256, KeyPair};

    fn keypairs(n: u8) -> Vec<KeyPair> {
        (1..=n)
            .map(|i| KeyPair::from_secret(&[i; 32]).unwrap())
            .collect()
    }

    fn set(keypairs: &[KeyPair], power: u64) -> ValidatorSet {
        ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), power)))
    }

    #[test]
    fn quorum_passes_at_two_thirds() -> Result<(), QuorumError> {
        let keypairs = keypairs(3);
        let validators = set(&keypairs, 10);
        let digest = keccak256(b"digest");

        let signatures: Vec<_> = keypairs[..2].iter().map(|kp| kp.sign(&digest)).collect();
        validators.verify_quorum(&digest, &signatures)
    }

    #[test]
    fn quorum_fails_below_two_thirds() {
        let keypairs = keypairs(3);
        let validators = set(&keypairs, 10);
        let digest = keccak256(b"digest");

        let signatures = vec![keypairs[0].sign(&digest)];
        assert!(matches!(
            validators.verify_quorum(&digest, &signatures),
            Err(QuorumError::QuorumInsufficient { signed: 10, total: 30 })
        ));
    }

    #[test]
    fn duplicate_signers_count_once() {
        let keypairs = keypairs(3);
        let validators = set(&keypairs, 10);
        let digest = keccak256(b"digest");

        let signatures = vec![keypairs[0].sign(&digest), keypairs[0].sign(&digest)];
        assert!(validators.verify_quorum(&digest, &signatures).is_err());
    }

    #[test]
    fn unknown_signer_rejected() {
        let keypairs = keypairs(3);
        let validators = set(&keypairs[..2], 10);
        let digest = keccak256(b"digest");

        let signatures = vec![keypairs[2].sign(&digest)];
        assert!(matches!(
            validators.verify_quorum(&digest, &signatures),
            Err(QuorumError::UnknownSigner(_))
        ));
    }

    #[test]
    fn weighted_quorum_counts_power_not_heads() -> Result<(), QuorumError> {
        let keypairs = keypairs(3);
        let digest = keccak256(b"digest");
        let validators = ValidatorSet::from_entries([
            (keypairs[0].address(), 70),
            (keypairs[1].address(), 20),
            (keypairs[2].address(), 10),
        ]);

        // one heavyweight signer is enough
        validators.verify_quorum(&digest, &[keypairs[0].sign(&digest)])
    }

    #[test]
    fn governance_anchor_verifies_its_key_only() {
        let keypairs = keypairs(2);
        let digest = keccak256(b"manifest");
        let anchor = GovernanceAnchor::new(keypairs[0].address());

        assert!(anchor.verify(&digest, &keypairs[0].sign(&digest)).is_ok());
        assert!(anchor.verify(&digest, &keypairs[1].sign(&digest)).is_err());
    }
}
