use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    crypto::{sha256, sha256_concat, Address, Hash, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
    utils::canonical_json,
};

/// Block header as attested by validators. Hashing is over the canonical
/// JSON form so independent implementations agree byte-for-byte.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub height: u64,
    pub timestamp: u64,
    pub prev_hash: Hash,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub validator: Address,
}

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("header serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlockHeader {
    /// sha-256 of the canonical JSON encoding
    pub fn hash(&self) -> Result<Hash, HeaderError> {
        Ok(sha256(&canonical_json(self)?))
    }
}

impl Serializer for BlockHeader {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.height);
        writer.write_u64(&self.timestamp);
        self.prev_hash.write(writer);
        self.state_root.write(writer);
        self.tx_root.write(writer);
        self.validator.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(BlockHeader {
            height: reader.read_u64()?,
            timestamp: reader.read_u64()?,
            prev_hash: Hash::read(reader)?,
            state_root: Hash::read(reader)?,
            tx_root: Hash::read(reader)?,
            validator: Address::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + 8 + 32 * 3 + self.validator.size()
    }
}

/// Digest validators sign when attesting a header:
/// `sha256(chain_id_be64 ‖ height_be64 ‖ header_hash)`
pub fn proof_digest(chain_id: u64, height: u64, header_hash: &Hash) -> Hash {
    sha256_concat(&[
        &chain_id.to_be_bytes(),
        &height.to_be_bytes(),
        header_hash.as_bytes(),
    ])
}

/// A header paired with validator attestations over its proof digest
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlockProof {
    pub header: BlockHeader,
    pub signatures: Vec<Signature>,
}

impl BlockProof {
    pub fn digest(&self, chain_id: u64) -> Result<Hash, HeaderError> {
        let header_hash = self.header.hash()?;
        Ok(proof_digest(chain_id, self.header.height, &header_hash))
    }
}

impl Serializer for BlockProof {
    fn write(&self, writer: &mut Writer) {
        self.header.write(writer);
        self.signatures.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(BlockProof {
            header: BlockHeader::read(reader)?,
            signatures: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.header.size() + self.signatures.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keccak256;

    fn header() -> BlockHeader {
        BlockHeader {
            height: 42,
            timestamp: 1_700_000_000,
            prev_hash: keccak256(b"prev"),
            state_root: keccak256(b"state"),
            tx_root: keccak256(b"txs"),
            validator: Address::new([7u8; 20]),
        }
    }

    #[test]
    fn header_hash_is_stable() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(header().hash()?, header().hash()?);
        let mut other = header();
        other.height += 1;
        assert_ne!(header().hash()?, other.hash()?);
        Ok(())
    }

    #[test]
    fn proof_digest_binds_chain_and_height() -> Result<(), Box<dyn std::error::Error>> {
        let hash = header().hash()?;
        let a = proof_digest(1, 42, &hash);
        let b = proof_digest(2, 42, &hash);
        let c = proof_digest(1, 43, &hash);
        assert_ne!(a, b);
        assert_ne!(a, c);
        Ok(())
    }

    #[test]
    fn header_binary_roundtrip() -> Result<(), ReaderError> {
        let header = header();
        assert_eq!(BlockHeader::from_bytes(&header.to_bytes())?, header);
        Ok(())
    }
}
