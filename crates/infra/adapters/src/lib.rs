//! Concrete HTTP adapters for the ports the core depends on, plus the
//! init-system readiness notifier.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use contentnode_infra_ports::{
    KeyService, KeyServiceError, ObjectStore, ObjectStoreError, ParameterStore, ParameterStoreError,
    ReadyNotifier,
};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

fn build_client(user_agent: &str, timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .user_agent(user_agent.to_string())
        .build()
        .expect("failed to build HTTP client")
}

/// Reads parameter values by GET against `{base_url}/{key}`.
pub struct HttpParameterStore {
    client: Client,
    base_url: String,
}

impl HttpParameterStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client("content-node-parameter-store/0.1", Duration::from_secs(10)),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ParameterStore for HttpParameterStore {
    async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<String, ParameterStoreError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ParameterStoreError::Cancelled),
            result = self.client.get(&url).send() => result,
        }
        .map_err(|e| ParameterStoreError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .text()
                .await
                .map_err(|e| ParameterStoreError::Unavailable(e.to_string())),
            StatusCode::NOT_FOUND => Err(ParameterStoreError::NotFound(key.to_string())),
            status => Err(ParameterStoreError::Unavailable(format!("unexpected status {status}"))),
        }
    }
}

/// Streams object bytes by GET against `{base_url}/{key}`, rejecting
/// responses whose declared `Content-Length` already exceeds
/// `max_object_size` before a single byte is read.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    max_object_size: Option<u64>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, max_object_size: Option<u64>) -> Self {
        Self {
            client: build_client("content-node-object-store/0.1", Duration::from_secs(30)),
            base_url: base_url.into(),
            max_object_size,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_stream(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, Result<Bytes, ObjectStoreError>>, ObjectStoreError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ObjectStoreError::Cancelled),
            result = self.client.get(&url).send() => result,
        }
        .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ObjectStoreError::NotFound(key.to_string())),
            status if !status.is_success() => {
                return Err(ObjectStoreError::Unavailable(format!("unexpected status {status}")))
            }
            _ => {}
        }

        if let (Some(limit), Some(len)) = (self.max_object_size, response.content_length()) {
            if len > limit {
                return Err(ObjectStoreError::Oversized);
            }
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ObjectStoreError::Unavailable(e.to_string())));
        Ok(Box::pin(stream))
    }
}

/// Fetches PKIX DER-encoded public keys by GET against
/// `{base_url}/{key_name}`.
pub struct HttpKeyService {
    client: Client,
    base_url: String,
}

impl HttpKeyService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client("content-node-key-service/0.1", Duration::from_secs(10)),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl KeyService for HttpKeyService {
    async fn fetch_public_key_der(
        &self,
        key_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, KeyServiceError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key_name);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(KeyServiceError::Cancelled),
            result = self.client.get(&url).send() => result,
        }
        .map_err(|e| KeyServiceError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| KeyServiceError::Unavailable(e.to_string())),
            StatusCode::NOT_FOUND => Err(KeyServiceError::NotFound(key_name.to_string())),
            status => Err(KeyServiceError::Unavailable(format!("unexpected status {status}"))),
        }
    }
}

/// Notifies systemd (or any init system speaking the `sd_notify` wire
/// protocol) that the process is ready. A no-op when `NOTIFY_SOCKET`
/// isn't set.
pub struct SdNotifyNotifier;

impl ReadyNotifier for SdNotifyNotifier {
    fn notify_ready(&self) {
        if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
            tracing::debug!(error = %e, "sd_notify readiness signal not delivered");
        }
    }
}
