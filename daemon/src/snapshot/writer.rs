use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};
use metrics::counter;
use sha2::{Digest, Sha256};

use nhb_common::crypto::Hash;

use super::{ChunkMeta, SnapshotError, SnapshotManifest, MANIFEST_VERSION};
use crate::core::{trie::Trie, CancelToken};

struct OpenChunk {
    file: File,
    path: PathBuf,
    name: String,
    index: u32,
    hasher: Sha256,
    bytes: u64,
    entries: u64,
}

/// Streams the leaves of a state root into length-prefixed record chunks
/// of at most `chunk_size` bytes, hashing each chunk as it is written.
/// The writer never signs: signatures are attached by an external signer
/// before the manifest is served.
pub struct SnapshotWriter {
    dir: PathBuf,
    chunk_size: u64,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P, chunk_size: u64) -> Self {
        SnapshotWriter {
            dir: dir.as_ref().to_path_buf(),
            chunk_size: chunk_size.max(1),
        }
    }

    fn open_chunk(&self, index: u32) -> Result<OpenChunk, SnapshotError> {
        let name = format!("chunk-{:06}.bin", index);
        let path = self.dir.join(&name);
        let file = File::create(&path)?;
        Ok(OpenChunk {
            file,
            path,
            name,
            index,
            hasher: Sha256::new(),
            bytes: 0,
            entries: 0,
        })
    }

    // flush, fsync, close, then fold the chunk into the manifest
    fn seal_chunk(&self, mut chunk: OpenChunk, chunks: &mut Vec<ChunkMeta>) -> Result<(), SnapshotError> {
        chunk.file.flush()?;
        chunk.file.sync_all()?;
        drop(chunk.file);
        let hash = Hash::new(chunk.hasher.finalize().into());
        debug!(
            "sealed chunk {} ({} entries, {} bytes, {})",
            chunk.name, chunk.entries, chunk.bytes, hash
        );
        counter!("nhb_snapshot_chunks_written_total").increment(1);
        chunks.push(ChunkMeta {
            index: chunk.index,
            path: chunk.name,
            entries: chunk.entries,
            bytes: chunk.bytes,
            hash,
        });
        Ok(())
    }

    fn abort(&self, open: Option<&OpenChunk>, sealed: &[ChunkMeta]) {
        if let Some(chunk) = open {
            let _ = fs::remove_file(&chunk.path);
        }
        for chunk in sealed {
            let _ = fs::remove_file(self.dir.join(&chunk.path));
        }
    }

    /// Export the state at `root` into chunk files plus a manifest
    pub fn export(
        &self,
        trie: &Trie,
        root: &Hash,
        chain_id: u64,
        height: u64,
        cancel: &CancelToken,
    ) -> Result<SnapshotManifest, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let mut chunks: Vec<ChunkMeta> = Vec::new();
        let mut current: Option<OpenChunk> = None;
        let mut next_index: u32 = 0;
        let mut total_entries: u64 = 0;
        let mut total_bytes: u64 = 0;

        for entry in trie.iter(root)? {
            if cancel.is_cancelled() {
                self.abort(current.as_ref(), &chunks);
                return Err(SnapshotError::Cancelled);
            }
            let (key, value) = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.abort(current.as_ref(), &chunks);
                    return Err(err.into());
                }
            };

            let mut record =
                Vec::with_capacity(8 + key.as_bytes().len() + value.len());
            record.extend_from_slice(&(key.as_bytes().len() as u32).to_be_bytes());
            record.extend_from_slice(key.as_bytes());
            record.extend_from_slice(&(value.len() as u32).to_be_bytes());
            record.extend_from_slice(&value);
            let record_len = record.len() as u64;

            // rotate when the record would overflow a non-empty chunk
            if let Some(chunk) = current.take() {
                if chunk.bytes + record_len > self.chunk_size && chunk.entries > 0 {
                    self.seal_chunk(chunk, &mut chunks)?;
                } else {
                    current = Some(chunk);
                }
            }
            if current.is_none() {
                current = Some(self.open_chunk(next_index)?);
                next_index += 1;
            }

            let written = {
                let chunk = current.as_mut().expect("chunk opened above");
                chunk.file.write_all(&record).map(|_| {
                    chunk.hasher.update(&record);
                    chunk.bytes += record_len;
                    chunk.entries += 1;
                })
            };
            if let Err(err) = written {
                self.abort(current.as_ref(), &chunks);
                return Err(err.into());
            }
            total_entries += 1;
            total_bytes += record_len;
        }

        if let Some(chunk) = current.take() {
            self.seal_chunk(chunk, &mut chunks)?;
        }

        info!(
            "exported snapshot at height {}: {} entries, {} bytes, {} chunks",
            height,
            total_entries,
            total_bytes,
            chunks.len()
        );
        Ok(SnapshotManifest {
            version: MANIFEST_VERSION,
            chain_id,
            height,
            state_root: root.clone(),
            chunk_size: self.chunk_size,
            total_entries,
            total_bytes,
            chunks,
            signatures: Vec::new(),
            governance: None,
            metadata: BTreeMap::new(),
        })
    }
}
