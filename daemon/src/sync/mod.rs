use async_trait::async_trait;
use log::{debug, info};
use metrics::counter;
use thiserror::Error;

use nhb_common::{
    block::{BlockHeader, BlockProof, HeaderError},
    crypto::Hash,
};

use crate::core::{validator::QuorumError, CancelToken};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("non-sequential proof: expected height {expected}, got {got}")]
    NonSequentialProof { expected: u64, got: u64 },
    #[error("predecessor mismatch at height {height}: expected {expected}, got {got}")]
    PredecessorMismatch {
        height: u64,
        expected: Hash,
        got: Hash,
    },
    #[error("quorum check failed: {0}")]
    QuorumCheckFailed(#[from] QuorumError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("proof fetch: {0}")]
    Fetch(String),
    #[error("header apply: {0}")]
    Apply(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Sequential proof source; returns `None` once the range is exhausted
#[async_trait]
pub trait ProofFetcher: Send {
    async fn next(&mut self, from_height: u64) -> Result<Option<BlockProof>, SyncError>;
}

/// Persists verified headers
pub trait HeaderApplier: Send {
    fn apply(&mut self, header: &BlockHeader) -> Result<(), SyncError>;
}

/// Extends the chain from a checkpoint header by consuming sequential
/// validator-attested header proofs.
///
/// Each proof must be the immediate successor of the last applied
/// header, link to it by hash, and carry a ≥2/3 validator-weight quorum
/// over `sha256(chain_id ‖ height ‖ header_hash)`. A failure aborts the
/// sync; already-applied headers stay applied.
pub struct RangeSyncer {
    chain_id: u64,
    validators: crate::core::validator::ValidatorSet,
    last_header: BlockHeader,
}

impl RangeSyncer {
    pub fn new(
        chain_id: u64,
        validators: crate::core::validator::ValidatorSet,
        checkpoint: BlockHeader,
    ) -> Self {
        RangeSyncer {
            chain_id,
            validators,
            last_header: checkpoint,
        }
    }

    pub fn height(&self) -> u64 {
        self.last_header.height
    }

    pub fn last_header(&self) -> &BlockHeader {
        &self.last_header
    }

    /// Verify and apply a single proof
    pub fn apply_proof(
        &mut self,
        proof: &BlockProof,
        applier: Option<&mut (dyn HeaderApplier + '_)>,
    ) -> Result<(), SyncError> {
        let expected = self.last_header.height + 1;
        if proof.header.height != expected {
            return Err(SyncError::NonSequentialProof {
                expected,
                got: proof.header.height,
            });
        }

        let last_hash = self.last_header.hash()?;
        if proof.header.prev_hash != last_hash {
            return Err(SyncError::PredecessorMismatch {
                height: proof.header.height,
                expected: last_hash,
                got: proof.header.prev_hash.clone(),
            });
        }

        let digest = proof.digest(self.chain_id)?;
        self.validators.verify_quorum(&digest, &proof.signatures)?;

        if let Some(applier) = applier {
            applier.apply(&proof.header)?;
        }
        debug!("applied header proof at height {}", proof.header.height);
        counter!("nhb_range_sync_proofs_total").increment(1);
        self.last_header = proof.header.clone();
        Ok(())
    }

    /// Drain the fetcher until it signals the end of the range. Returns
    /// how many headers were applied.
    pub async fn run(
        &mut self,
        fetcher: &mut dyn ProofFetcher,
        mut applier: Option<&mut dyn HeaderApplier>,
        cancel: &CancelToken,
    ) -> Result<u64, SyncError> {
        let mut applied = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let Some(proof) = fetcher.next(self.last_header.height + 1).await? else {
                break;
            };
            self.apply_proof(&proof, applier.as_deref_mut())?;
            applied += 1;
        }
        info!(
            "range sync applied {} headers, now at height {}",
            applied,
            self.last_header.height
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::ValidatorSet;
    use nhb_common::{
        block::proof_digest,
        crypto::{keccak256, Address, KeyPair},
    };

    const CHAIN_ID: u64 = 187001;

    fn keypairs(n: u8) -> Vec<KeyPair> {
        (1..=n)
            .map(|i| KeyPair::from_secret(&[i; 32]).unwrap())
            .collect()
    }

    fn checkpoint() -> BlockHeader {
        BlockHeader {
            height: 100,
            timestamp: 1_700_000_000,
            prev_hash: keccak256(b"genesis"),
            state_root: keccak256(b"state"),
            tx_root: keccak256(b"txs"),
            validator: Address::new([1u8; 20]),
        }
    }

    fn next_header(prev: &BlockHeader) -> BlockHeader {
        BlockHeader {
            height: prev.height + 1,
            timestamp: prev.timestamp + 5,
            prev_hash: prev.hash().unwrap(),
            state_root: keccak256(&prev.height.to_be_bytes()),
            tx_root: keccak256(b"txs"),
            validator: Address::new([1u8; 20]),
        }
    }

    fn sign_proof(header: BlockHeader, signers: &[&KeyPair]) -> BlockProof {
        let digest = proof_digest(CHAIN_ID, header.height, &header.hash().unwrap());
        let signatures = signers.iter().map(|kp| kp.sign(&digest)).collect();
        BlockProof { header, signatures }
    }

    struct VecFetcher {
        proofs: std::vec::IntoIter<BlockProof>,
    }

    #[async_trait]
    impl ProofFetcher for VecFetcher {
        async fn next(&mut self, _from: u64) -> Result<Option<BlockProof>, SyncError> {
            Ok(self.proofs.next())
        }
    }

    struct RecordingApplier {
        heights: Vec<u64>,
    }

    impl HeaderApplier for RecordingApplier {
        fn apply(&mut self, header: &BlockHeader) -> Result<(), SyncError> {
            self.heights.push(header.height);
            Ok(())
        }
    }

    #[tokio::test]
    async fn applies_a_sequential_range() -> Result<(), SyncError> {
        let keypairs = keypairs(3);
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 1u64)));

        let checkpoint = checkpoint();
        let h1 = next_header(&checkpoint);
        let h2 = next_header(&h1);
        let signers: Vec<&KeyPair> = keypairs.iter().collect();
        let proofs = vec![
            sign_proof(h1, &signers),
            sign_proof(h2, &signers),
        ];

        let mut syncer = RangeSyncer::new(CHAIN_ID, validators, checkpoint);
        let mut fetcher = VecFetcher {
            proofs: proofs.into_iter(),
        };
        let mut applier = RecordingApplier { heights: vec![] };
        let applied = syncer
            .run(&mut fetcher, Some(&mut applier), &CancelToken::new())
            .await?;

        assert_eq!(applied, 2);
        assert_eq!(applier.heights, vec![101, 102]);
        assert_eq!(syncer.height(), 102);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_height_gap() {
        let keypairs = keypairs(3);
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 1u64)));

        let checkpoint = checkpoint();
        let h1 = next_header(&checkpoint);
        let h2 = next_header(&h1);
        let signers: Vec<&KeyPair> = keypairs.iter().collect();
        // skip h1 entirely
        let proofs = vec![sign_proof(h2, &signers)];

        let mut syncer = RangeSyncer::new(CHAIN_ID, validators, checkpoint);
        let mut fetcher = VecFetcher {
            proofs: proofs.into_iter(),
        };
        let result = syncer.run(&mut fetcher, None, &CancelToken::new()).await;
        assert!(matches!(
            result,
            Err(SyncError::NonSequentialProof {
                expected: 101,
                got: 102
            })
        ));
    }

    #[tokio::test]
    async fn rejects_broken_predecessor_link() {
        let keypairs = keypairs(3);
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 1u64)));

        let checkpoint = checkpoint();
        let mut h1 = next_header(&checkpoint);
        h1.prev_hash = keccak256(b"not-the-checkpoint");
        let signers: Vec<&KeyPair> = keypairs.iter().collect();
        let proof = sign_proof(h1, &signers);

        let mut syncer = RangeSyncer::new(CHAIN_ID, validators, checkpoint);
        assert!(matches!(
            syncer.apply_proof(&proof, None),
            Err(SyncError::PredecessorMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_under_quorum_proof() {
        let keypairs = keypairs(3);
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 10u64)));

        let checkpoint = checkpoint();
        let h1 = next_header(&checkpoint);
        // one signer of three is below 2/3
        let proof = sign_proof(h1, &[&keypairs[0]]);

        let mut syncer = RangeSyncer::new(CHAIN_ID, validators, checkpoint);
        assert!(matches!(
            syncer.apply_proof(&proof, None),
            Err(SyncError::QuorumCheckFailed(_))
        ));
        // the syncer did not advance
        assert_eq!(syncer.height(), 100);
    }

    #[tokio::test]
    async fn cancellation_aborts_between_proofs() {
        let keypairs = keypairs(1);
        let validators =
            ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 1u64)));
        let mut syncer = RangeSyncer::new(CHAIN_ID, validators, checkpoint());
        let mut fetcher = VecFetcher {
            proofs: Vec::new().into_iter(),
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = syncer.run(&mut fetcher, None, &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
