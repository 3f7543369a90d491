//! Trait contracts for the external collaborators the core consumes:
//! the parameter store, the object store, the key service, and the
//! init-system readiness notifier. Concrete implementations live in
//! `contentnode-infra-adapters`; tests use simple in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ParameterStoreError {
    #[error("parameter store unavailable: {0}")]
    Unavailable(String),
    #[error("parameter key not found: {0}")]
    NotFound(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Read-by-name access to a remote key/value parameter store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Returns the raw string value for `key`.
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<String, ParameterStoreError>;
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("object exceeds the configured size ceiling")]
    Oversized,
    #[error("operation cancelled")]
    Cancelled,
}

/// Read-by-key access to a remote object store. Returns a stream of byte
/// chunks so callers can hash/bound the size as data arrives rather than
/// buffering the whole object first.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_stream(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, Result<Bytes, ObjectStoreError>>, ObjectStoreError>;
}

#[derive(Debug, Error)]
pub enum KeyServiceError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("key service unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Fetch-by-name access to a remote KMS-like public key service. The core
/// calls this once per key name per process and caches the result.
#[async_trait]
pub trait KeyService: Send + Sync {
    /// Returns the PKIX DER encoding of the named public key.
    async fn fetch_public_key_der(
        &self,
        key_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, KeyServiceError>;
}

/// Notifies the init system (e.g. systemd) that the process is ready.
/// A no-op on platforms without such a mechanism.
pub trait ReadyNotifier: Send + Sync {
    fn notify_ready(&self);
}

/// A `ReadyNotifier` that does nothing, used when no notify socket is
/// configured.
pub struct NoopReadyNotifier;

impl ReadyNotifier for NoopReadyNotifier {
    fn notify_ready(&self) {}
}
