use std::{fs, path::Path};

use log::{debug, warn};
use metrics::counter;

use nhb_common::crypto::{sha256, Hash, HASH_SIZE};

use super::{SnapshotError, SnapshotManifest};
use crate::core::{trie::Trie, CancelToken};

/// Rebuilds a trie from exported chunks, verifying every chunk hash and
/// finally requiring the reconstructed root to match the manifest.
#[derive(Default)]
pub struct SnapshotLoader;

impl SnapshotLoader {
    pub fn new() -> Self {
        SnapshotLoader
    }

    /// Stream all chunks into `trie` and commit at the manifest height.
    /// Returns the committed root.
    pub fn load<P: AsRef<Path>>(
        &self,
        dir: P,
        manifest: &SnapshotManifest,
        trie: &mut Trie,
        cancel: &CancelToken,
    ) -> Result<Hash, SnapshotError> {
        let dir = dir.as_ref();
        for chunk in &manifest.chunks {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            let bytes = fs::read(dir.join(&chunk.path))?;
            let actual = sha256(&bytes);
            if actual != chunk.hash {
                return Err(SnapshotError::ChunkHashMismatch {
                    index: chunk.index,
                    expected: chunk.hash.clone(),
                    actual,
                });
            }

            let entries = self.apply_chunk(&bytes, trie, cancel)?;
            if entries != chunk.entries {
                return Err(SnapshotError::ChunkEntryMismatch {
                    index: chunk.index,
                    expected: chunk.entries,
                    actual: entries,
                });
            }
            debug!("applied chunk {} ({} entries)", chunk.path, entries);
            counter!("nhb_snapshot_chunks_verified_total").increment(1);
        }

        let actual = trie.hash();
        if actual != manifest.state_root {
            return Err(SnapshotError::RootMismatch {
                expected: manifest.state_root.clone(),
                actual,
            });
        }
        let root = trie.commit(manifest.height).map_err(SnapshotError::from)?;
        Ok(root)
    }

    // record := key_len(u32 be) ‖ key ‖ val_len(u32 be) ‖ value
    // an all-zero header pair terminates the chunk; empty keys are skipped
    fn apply_chunk(
        &self,
        bytes: &[u8],
        trie: &mut Trie,
        cancel: &CancelToken,
    ) -> Result<u64, SnapshotError> {
        let mut offset = 0usize;
        let mut entries = 0u64;
        while offset < bytes.len() {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            let key_len = read_u32(bytes, &mut offset)? as usize;
            let key = read_slice(bytes, &mut offset, key_len)?;
            let val_len = read_u32(bytes, &mut offset)? as usize;
            let value = read_slice(bytes, &mut offset, val_len)?;

            if key_len == 0 && val_len == 0 {
                break;
            }
            if key.is_empty() {
                warn!("skipping chunk record with empty key");
                continue;
            }
            if key.len() != HASH_SIZE {
                return Err(SnapshotError::InvalidRecord(format!(
                    "key length {} is not {}",
                    key.len(),
                    HASH_SIZE
                )));
            }
            let key = Hash::new(key.try_into().expect("length checked above"));
            trie.put(&key, value.to_vec())?;
            entries += 1;
        }
        Ok(entries)
    }
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, SnapshotError> {
    let end = *offset + 4;
    if end > bytes.len() {
        return Err(SnapshotError::InvalidRecord("truncated length header".into()));
    }
    let value = u32::from_be_bytes(bytes[*offset..end].try_into().expect("4 bytes"));
    *offset = end;
    Ok(value)
}

fn read_slice<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    len: usize,
) -> Result<&'a [u8], SnapshotError> {
    let end = *offset + len;
    if end > bytes.len() {
        return Err(SnapshotError::InvalidRecord("truncated record body".into()));
    }
    let slice = &bytes[*offset..end];
    *offset = end;
    Ok(slice)
}
