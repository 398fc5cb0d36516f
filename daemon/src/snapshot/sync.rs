use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use log::{info, warn};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::CryptoProvider,
    DigitallySignedStruct, SignatureScheme,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

use nhb_common::crypto::{sha256, Hash};

use super::{SnapshotError, SnapshotLoader, SnapshotManifest};
use crate::{
    config::{DEFAULT_HTTP_TIMEOUT, INSTALL_BACKUP_SUFFIX, INSTALL_TMP_SUFFIX},
    core::{
        storage::{Database, SledDatabase},
        trie::Trie,
        CancelToken,
    },
};

/// Transport used to retrieve chunk files. The production implementation
/// is the pinned HTTP fetcher; tests substitute an in-memory fake.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SnapshotError>;
}

// Accepts exactly the certificate whose sha-256 matches the pin,
// regardless of chain or name. Signature checks still run against the
// provider's algorithms.
#[derive(Debug)]
struct PinnedCertVerifier {
    pin: [u8; 32],
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let digest = sha256(end_entity.as_ref());
        if digest.as_bytes() == &self.pin {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General("certificate pin mismatch".into()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn pinned_tls_config(pin: [u8; 32]) -> Result<rustls::ClientConfig, SnapshotError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| SnapshotError::Transport(err.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier { pin, provider }))
        .with_no_client_auth();
    Ok(config)
}

/// HTTP chunk fetcher with an optional sha-256 certificate pin and 2xx
/// status enforcement
pub struct HttpChunkFetcher {
    client: reqwest::Client,
}

impl HttpChunkFetcher {
    pub fn new(cert_pin: Option<[u8; 32]>) -> Result<Self, SnapshotError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT, cert_pin)
    }

    pub fn with_timeout(
        timeout: Duration,
        cert_pin: Option<[u8; 32]>,
    ) -> Result<Self, SnapshotError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(pin) = cert_pin {
            builder = builder.use_preconfigured_tls(pinned_tls_config(pin)?);
        }
        let client = builder
            .build()
            .map_err(|err| SnapshotError::Transport(err.to_string()))?;
        Ok(HttpChunkFetcher { client })
    }
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SnapshotError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            let message = err.to_string();
            if message.contains("certificate pin mismatch") {
                SnapshotError::TlsPinMismatch
            } else {
                SnapshotError::Transport(message)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::TransportStatus(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SnapshotError::Transport(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Coordinates snapshot export/import on a node: resumable chunk
/// downloads and the atomic database-directory swap.
pub struct SyncManager {
    chunk_dir: PathBuf,
}

impl SyncManager {
    pub fn new<P: AsRef<Path>>(chunk_dir: P) -> Self {
        SyncManager {
            chunk_dir: chunk_dir.as_ref().to_path_buf(),
        }
    }

    pub fn chunk_dir(&self) -> &Path {
        &self.chunk_dir
    }

    /// Download every chunk that is missing or fails its hash check.
    /// Chunks already on disk with a matching hash are skipped, which
    /// makes interrupted downloads resumable.
    pub async fn ensure_chunks(
        &self,
        manifest: &SnapshotManifest,
        base_url: &str,
        fetcher: &dyn ChunkFetcher,
        cancel: &CancelToken,
    ) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.chunk_dir)?;
        let base = base_url.trim_end_matches('/');

        for chunk in &manifest.chunks {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            let path = self.chunk_dir.join(&chunk.path);
            if path.exists() {
                let existing = fs::read(&path)?;
                if sha256(&existing) == chunk.hash {
                    continue;
                }
                warn!("chunk {} on disk is corrupt, refetching", chunk.path);
            }

            let url = format!("{}/{}", base, chunk.path);
            let bytes = fetcher.fetch(&url).await?;
            let actual = sha256(&bytes);
            if actual != chunk.hash {
                return Err(SnapshotError::ChunkHashMismatch {
                    index: chunk.index,
                    expected: chunk.hash.clone(),
                    actual,
                });
            }
            fs::write(&path, &bytes)?;
            info!("fetched chunk {} ({} bytes)", chunk.path, bytes.len());
        }
        Ok(())
    }

    /// Load the snapshot into a scratch database, verify the root, then
    /// swap directories: `target → target.bak`, `tmp → target`. On any
    /// failure the scratch directory is removed and the active database
    /// stays untouched. Callers must guarantee no process still holds
    /// the old database open across the swap.
    pub fn install_snapshot<P: AsRef<Path>>(
        &self,
        manifest: &SnapshotManifest,
        target_dir: P,
        cancel: &CancelToken,
    ) -> Result<Hash, SnapshotError> {
        let target = target_dir.as_ref();
        let tmp = install_path(target, INSTALL_TMP_SUFFIX);
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }

        let loaded = self.load_into(manifest, &tmp, cancel);
        let root = match loaded {
            Ok(root) => root,
            Err(err) => {
                let _ = fs::remove_dir_all(&tmp);
                return Err(err);
            }
        };

        let backup = install_path(target, INSTALL_BACKUP_SUFFIX);
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }
        if target.exists() {
            fs::rename(target, &backup)?;
        }
        fs::rename(&tmp, target)?;
        info!(
            "installed snapshot at height {} with root {}",
            manifest.height, root
        );
        Ok(root)
    }

    fn load_into(
        &self,
        manifest: &SnapshotManifest,
        tmp: &Path,
        cancel: &CancelToken,
    ) -> Result<Hash, SnapshotError> {
        let db = Arc::new(SledDatabase::open(tmp).map_err(crate::core::error::ChainError::from)?);
        let mut trie = Trie::open(db.clone())?;
        let root = SnapshotLoader::new().load(&self.chunk_dir, manifest, &mut trie, cancel)?;
        db.flush().map_err(crate::core::error::ChainError::from)?;
        Ok(root)
    }
}

fn install_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}
