mod loader;
mod manifest;
mod sync;
mod writer;

pub use loader::SnapshotLoader;
pub use manifest::{ChunkMeta, GovernanceSig, SnapshotManifest, ValidatorSig, MANIFEST_VERSION};
pub use sync::{ChunkFetcher, HttpChunkFetcher, SyncManager};
pub use writer::SnapshotWriter;

use thiserror::Error;

use nhb_common::crypto::Hash;

use crate::core::{error::ChainError, validator::QuorumError};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk {index} hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch {
        index: u32,
        expected: Hash,
        actual: Hash,
    },
    #[error("chunk {index} record count mismatch: expected {expected}, got {actual}")]
    ChunkEntryMismatch {
        index: u32,
        expected: u64,
        actual: u64,
    },
    #[error("malformed chunk record: {0}")]
    InvalidRecord(String),
    #[error("reconstructed root {actual} does not match manifest root {expected}")]
    RootMismatch { expected: Hash, actual: Hash },
    #[error("manifest has neither validator signatures nor a governance anchor")]
    InsufficientTrustRoot,
    #[error("manifest signatures require a validator set to verify against")]
    ManifestSignatureMissing,
    #[error(transparent)]
    Quorum(#[from] QuorumError),
    #[error("server certificate does not match the pinned fingerprint")]
    TlsPinMismatch,
    #[error("transport returned status {0}")]
    TransportStatus(u16),
    #[error("transport: {0}")]
    Transport(String),
    #[error("manifest serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("operation cancelled")]
    Cancelled,
}
