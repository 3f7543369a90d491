//! Loader: turns a parameter-store pointer into a verified, extracted,
//! assembled `Snapshot`.

use std::sync::Arc;

use chrono::Utc;
use contentnode_core_archive::{extract, ArchiveError, ExtractLimits};
use contentnode_core_verify::{VerifyError, Verifier};
use contentnode_domain_hash::{hash, hash_equal, HashAlgorithm};
use contentnode_domain_model::{Manifest, Pointer, RelPath, Snapshot, SnapshotMeta, SnapshotSource};
use contentnode_infra_ports::{KeyService, ObjectStore, ObjectStoreError, ParameterStore};
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("parameter store pointer unavailable: {0}")]
    PointerUnavailable(String),
    #[error("parameter store pointer malformed: {0}")]
    PointerMalformed(String),
    #[error("object unavailable: {0}")]
    ObjectUnavailable(String),
    #[error("object exceeds the configured bundle size ceiling")]
    ObjectOversized,
    #[error("downloaded bundle digest does not match the pointer")]
    DigestMismatch,
    #[error("signature verification failed: {0}")]
    SignatureInvalid(#[from] VerifyError),
    #[error("bundle extraction failed: {0}")]
    ExtractFailed(#[from] ArchiveError),
}

/// Static configuration the Loader needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub parameter_key: String,
    pub object_prefix: Option<String>,
    pub signing_key_name: String,
    pub max_bundle_size: u64,
    pub extract_limits: ExtractLimits,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            parameter_key: "content-bundle-pointer".to_string(),
            object_prefix: None,
            signing_key_name: "content-signing-key".to_string(),
            max_bundle_size: 256 * 1024 * 1024,
            extract_limits: ExtractLimits::default(),
        }
    }
}

pub struct Loader<P: ParameterStore, O: ObjectStore, K: KeyService> {
    parameter_store: Arc<P>,
    object_store: Arc<O>,
    verifier: Arc<Verifier<K>>,
    config: LoaderConfig,
}

impl<P: ParameterStore, O: ObjectStore, K: KeyService> Loader<P, O, K> {
    pub fn new(
        parameter_store: Arc<P>,
        object_store: Arc<O>,
        verifier: Arc<Verifier<K>>,
        config: LoaderConfig,
    ) -> Self {
        Self {
            parameter_store,
            object_store,
            verifier,
            config,
        }
    }

    /// Reads the configured parameter-store key and parses it as
    /// `{algorithm}:{hex-digest}`.
    pub async fn fetch_pointer(&self, cancel: &CancellationToken) -> Result<Pointer, LoaderError> {
        let raw = self
            .parameter_store
            .get(&self.config.parameter_key, cancel)
            .await
            .map_err(|e| LoaderError::PointerUnavailable(e.to_string()))?;
        let trimmed = raw.trim();
        let (algorithm_str, digest) = trimmed
            .split_once(':')
            .ok_or_else(|| LoaderError::PointerMalformed("missing ':' separator".to_string()))?;
        if digest.is_empty() {
            return Err(LoaderError::PointerMalformed("empty digest".to_string()));
        }
        let algorithm = HashAlgorithm::parse(algorithm_str).ok_or_else(|| {
            LoaderError::PointerMalformed(format!("unrecognised algorithm: {algorithm_str}"))
        })?;
        Ok(Pointer {
            algorithm,
            digest: digest.to_string(),
        })
    }

    /// Fetches, verifies, extracts, and assembles the `Snapshot` for
    /// `pointer`.
    pub async fn load(
        &self,
        pointer: &Pointer,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, LoaderError> {
        let loaded_at = Utc::now();
        let object_key = pointer.object_key(self.config.object_prefix.as_deref());
        let signature_key = pointer.signature_key(self.config.object_prefix.as_deref());

        let (tarball, streamed_hash) = self
            .fetch_bounded_hashing(&object_key, pointer.algorithm, cancel)
            .await?;
        let signature_bundle = self.fetch_bounded(&signature_key, cancel).await?;

        if !hash_equal(&streamed_hash, &pointer.digest) {
            return Err(LoaderError::DigestMismatch);
        }

        self.verifier
            .verify(&self.config.signing_key_name, &tarball, &signature_bundle, cancel)
            .await?;

        let fs = extract(&tarball, self.config.extract_limits)?;

        let manifest = RelPath::new("provenance.json")
            .ok()
            .and_then(|path| fs.get(&path))
            .and_then(|entry| match serde_json::from_slice::<Manifest>(&entry.bytes) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(error = %e, "provenance.json failed to parse; continuing without a manifest");
                    None
                }
            });

        let meta = SnapshotMeta {
            hash_algorithm: pointer.algorithm,
            hash: pointer.digest.clone(),
            source: SnapshotSource::ObjectStore,
            verified_at: Utc::now(),
            loaded_at: Some(loaded_at),
            version: manifest.as_ref().and_then(|m| m.version.clone()),
        };

        Ok(Snapshot::new(fs, meta, manifest))
    }

    async fn fetch_bounded(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, LoaderError> {
        let to_loader_error = |e: ObjectStoreError| match e {
            ObjectStoreError::Oversized => LoaderError::ObjectOversized,
            other => LoaderError::ObjectUnavailable(other.to_string()),
        };

        let mut stream = self
            .object_store
            .get_stream(key, cancel)
            .await
            .map_err(to_loader_error)?;

        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(to_loader_error)?;
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > self.config.max_bundle_size {
                return Err(LoaderError::ObjectOversized);
            }
        }
        Ok(buf)
    }

    /// Streams `key` into memory, hashing each chunk as it arrives under
    /// `algorithm` so the digest is ready the instant the last byte lands
    /// rather than requiring a second pass over the buffered bytes.
    async fn fetch_bounded_hashing(
        &self,
        key: &str,
        algorithm: HashAlgorithm,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, String), LoaderError> {
        let to_loader_error = |e: ObjectStoreError| match e {
            ObjectStoreError::Oversized => LoaderError::ObjectOversized,
            other => LoaderError::ObjectUnavailable(other.to_string()),
        };

        let mut stream = self
            .object_store
            .get_stream(key, cancel)
            .await
            .map_err(to_loader_error)?;

        let mut buf = Vec::new();
        let mut hasher = contentnode_domain_hash::StreamingHasher::new(algorithm);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(to_loader_error)?;
            hasher.update(&chunk);
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > self.config.max_bundle_size {
                return Err(LoaderError::ObjectOversized);
            }
        }
        Ok((buf, hasher.finalize_hex()))
    }
}
