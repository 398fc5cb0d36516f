mod common;

use std::{fs, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use primitive_types::U256;
use tempdir::TempDir;

use common::keypair;
use nhb_common::{
    crypto::{Address, KeyPair},
    escrow::Token,
};
use nhb_daemon::{
    core::{
        state::{AccountState, StateManager},
        storage::MemoryDatabase,
        trie::Trie,
        validator::ValidatorSet,
        CancelToken,
    },
    snapshot::{
        ChunkFetcher, SnapshotError, SnapshotLoader, SnapshotManifest, SnapshotWriter,
        SyncManager, ValidatorSig,
    },
};

const CHAIN_ID: u64 = 187001;
const HEIGHT: u64 = 42;

// serves chunk files straight from the export directory
struct DirFetcher {
    dir: PathBuf,
    fail_after: Option<usize>,
    served: std::sync::atomic::AtomicUsize,
}

impl DirFetcher {
    fn new(dir: PathBuf) -> Self {
        DirFetcher {
            dir,
            fail_after: None,
            served: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChunkFetcher for DirFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
        let count = self
            .served
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if count >= limit {
                return Err(SnapshotError::TransportStatus(503));
            }
        }
        let name = url.rsplit('/').next().expect("url has a path");
        Ok(fs::read(self.dir.join(name))?)
    }
}

// a state with enough accounts to spread over several chunks
fn populated_state() -> Result<StateManager, Box<dyn std::error::Error>> {
    let trie = Trie::open(Arc::new(MemoryDatabase::new()))?;
    let mut state = StateManager::new(trie);
    for i in 0u64..64 {
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&i.to_be_bytes());
        let address = Address::new(bytes);
        state.credit(&address, Token::Nhb, U256::from(1000 + i))?;
        state.credit(&address, Token::Znhb, U256::from(i))?;
    }
    Ok(state)
}

fn signed_manifest(
    mut manifest: SnapshotManifest,
    keypairs: &[KeyPair],
) -> Result<SnapshotManifest, SnapshotError> {
    let digest = manifest.digest()?;
    for keypair in keypairs {
        manifest.signatures.push(ValidatorSig {
            validator: keypair.address(),
            signature: keypair.sign(&digest),
        });
    }
    Ok(manifest)
}

#[test]
fn export_and_reload_reproduces_the_root() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-snapshot-export")?;
    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;

    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;
    assert!(manifest.chunks.len() > 1, "512-byte chunks force a split");
    assert_eq!(manifest.state_root, root);
    assert_eq!(manifest.total_entries, 128);

    // rebuild on a fresh database
    let mut trie = Trie::open(Arc::new(MemoryDatabase::new()))?;
    let loaded_root =
        SnapshotLoader::new().load(export_dir.path(), &manifest, &mut trie, &CancelToken::new())?;
    assert_eq!(loaded_root, root);
    Ok(())
}

#[test]
fn corrupted_chunk_fails_verification() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-snapshot-corrupt")?;
    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;

    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;

    // flip one byte in the middle of the first chunk
    let chunk_path = export_dir.path().join(&manifest.chunks[0].path);
    let mut bytes = fs::read(&chunk_path)?;
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xff;
    fs::write(&chunk_path, bytes)?;

    let mut trie = Trie::open(Arc::new(MemoryDatabase::new()))?;
    let result =
        SnapshotLoader::new().load(export_dir.path(), &manifest, &mut trie, &CancelToken::new());
    assert!(matches!(
        result,
        Err(SnapshotError::ChunkHashMismatch { index: 0, .. })
    ));
    Ok(())
}

#[test]
fn manifest_quorum_covers_chunk_hashes() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-snapshot-signed")?;
    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;

    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;

    let keypairs: Vec<KeyPair> = (1u8..=3).map(keypair).collect();
    let validators = ValidatorSet::from_entries(keypairs.iter().map(|kp| (kp.address(), 10u64)));
    let signed = signed_manifest(manifest, &keypairs[..2])?;
    signed.verify(Some(&validators), None)?;

    // mutating any chunk hash invalidates the signatures
    let mut tampered = signed;
    tampered.chunks[0].hash = nhb_common::crypto::keccak256(b"evil");
    assert!(tampered.verify(Some(&validators), None).is_err());
    Ok(())
}

#[tokio::test]
async fn ensure_chunks_is_resumable() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-snapshot-src")?;
    let download_dir = TempDir::new("nhb-snapshot-dst")?;
    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;

    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;
    let sync = SyncManager::new(download_dir.path());
    let cancel = CancelToken::new();

    // first run fails partway through
    let mut failing = DirFetcher::new(export_dir.path().to_path_buf());
    failing.fail_after = Some(1);
    let result = sync
        .ensure_chunks(&manifest, "http://snapshots.example", &failing, &cancel)
        .await;
    assert!(matches!(result, Err(SnapshotError::TransportStatus(503))));

    // the retry only downloads what is missing
    let fetcher = DirFetcher::new(export_dir.path().to_path_buf());
    sync.ensure_chunks(&manifest, "http://snapshots.example", &fetcher, &cancel)
        .await?;
    let fetched = fetcher.served.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(fetched as u64, manifest.chunks.len() as u64 - 1);

    // a third run touches nothing
    let idle = DirFetcher::new(export_dir.path().to_path_buf());
    sync.ensure_chunks(&manifest, "http://snapshots.example", &idle, &cancel)
        .await?;
    assert_eq!(idle.served.load(std::sync::atomic::Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn install_swaps_directories_atomically() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-install-src")?;
    let download_dir = TempDir::new("nhb-install-chunks")?;
    let db_root = TempDir::new("nhb-install-db")?;
    let target = db_root.path().join("state");

    // the node already has a database that must survive as .bak
    fs::create_dir_all(&target)?;
    fs::write(target.join("sentinel"), b"previous database")?;

    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;
    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;

    let sync = SyncManager::new(download_dir.path());
    let cancel = CancelToken::new();
    let fetcher = DirFetcher::new(export_dir.path().to_path_buf());
    sync.ensure_chunks(&manifest, "http://snapshots.example", &fetcher, &cancel)
        .await?;

    let installed_root = sync.install_snapshot(&manifest, &target, &cancel)?;
    assert_eq!(installed_root, root);

    // prior database was renamed aside
    let backup = db_root.path().join("state.bak");
    assert!(backup.join("sentinel").exists());
    // the new target is a live database directory
    assert!(target.exists());
    assert!(!db_root.path().join("state.tmp-install").exists());
    Ok(())
}

#[tokio::test]
async fn failed_install_leaves_target_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let export_dir = TempDir::new("nhb-failed-src")?;
    let download_dir = TempDir::new("nhb-failed-chunks")?;
    let db_root = TempDir::new("nhb-failed-db")?;
    let target = db_root.path().join("state");
    fs::create_dir_all(&target)?;
    fs::write(target.join("sentinel"), b"previous database")?;

    let mut state = populated_state()?;
    let root = state.commit(HEIGHT)?;
    let writer = SnapshotWriter::new(export_dir.path(), 512);
    let manifest = writer.export(state.trie(), &root, CHAIN_ID, HEIGHT, &CancelToken::new())?;

    let sync = SyncManager::new(download_dir.path());
    let cancel = CancelToken::new();
    let fetcher = DirFetcher::new(export_dir.path().to_path_buf());
    sync.ensure_chunks(&manifest, "http://snapshots.example", &fetcher, &cancel)
        .await?;

    // corrupt one downloaded chunk after the integrity check
    let chunk_path = download_dir.path().join(&manifest.chunks[0].path);
    let mut bytes = fs::read(&chunk_path)?;
    bytes[0] ^= 0xff;
    fs::write(&chunk_path, bytes)?;

    let result = sync.install_snapshot(&manifest, &target, &cancel);
    assert!(matches!(
        result,
        Err(SnapshotError::ChunkHashMismatch { .. })
    ));

    // the active database is unchanged and no scratch directory remains
    assert!(target.join("sentinel").exists());
    assert!(!db_root.path().join("state.bak").exists());
    assert!(!db_root.path().join("state.tmp-install").exists());
    Ok(())
}
