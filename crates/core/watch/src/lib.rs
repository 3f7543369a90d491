//! Watcher: the single task that polls the parameter-store pointer,
//! loads and validates new bundles, and publishes them into the
//! Snapshot Store.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use contentnode_core_loader::{Loader, LoaderError};
use contentnode_core_store::{validate, Store, ValidateOptions};
use contentnode_domain_hash::hash_equal;
use contentnode_infra_ports::{KeyService, ObjectStore, ParameterStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
    pub stale_threshold: Duration,
    pub validate_opts: ValidateOptions,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            validate_opts: ValidateOptions::default(),
        }
    }
}

impl WatcherConfig {
    fn effective_interval(&self) -> Duration {
        if self.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            self.interval
        }
    }
}

/// The result of a single poll cycle, used by tests and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    SsmError,
    NoChange,
    LoadError,
    ValidationError,
    Swapped,
}

/// Runs the poll/backoff/staleness state machine on its own task.
/// Construct once, then `Arc` it and call `run`.
pub struct Watcher<P: ParameterStore, O: ObjectStore, K: KeyService> {
    loader: Arc<Loader<P, O, K>>,
    store: Arc<Store>,
    config: WatcherConfig,
    on_swap: Box<dyn Fn(&str, Option<&str>) + Send + Sync>,
    on_error: Box<dyn Fn(&'static str) + Send + Sync>,
    on_load_duration: Box<dyn Fn(f64) + Send + Sync>,
    current_hash: Mutex<Option<String>>,
    consecutive_errs: AtomicU32,
    poll_count: AtomicU64,
    swap_count: AtomicU64,
    last_successful_pointer_read: Mutex<Option<DateTime<Utc>>>,
    stale: AtomicBool,
}

impl<P: ParameterStore, O: ObjectStore, K: KeyService> Watcher<P, O, K> {
    /// `on_swap` is invoked inside a panic-safe boundary after every
    /// successful publish; a panic inside it is caught, logged, and
    /// never propagated to the poll loop.
    pub fn new(
        loader: Arc<Loader<P, O, K>>,
        store: Arc<Store>,
        config: WatcherConfig,
        on_swap: impl Fn(&str, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        let seeded_hash = store.content_hash();
        Self {
            loader,
            store,
            config,
            on_swap: Box::new(on_swap),
            on_error: Box::new(|_| {}),
            on_load_duration: Box::new(|_| {}),
            current_hash: Mutex::new(seeded_hash),
            consecutive_errs: AtomicU32::new(0),
            poll_count: AtomicU64::new(0),
            swap_count: AtomicU64::new(0),
            last_successful_pointer_read: Mutex::new(None),
            stale: AtomicBool::new(false),
        }
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count.load(Ordering::Relaxed)
    }

    pub fn swap_count(&self) -> u64 {
        self.swap_count.load(Ordering::Relaxed)
    }

    /// Unix timestamp of the last successful pointer read, if any.
    pub fn last_success_unix(&self) -> Option<i64> {
        self.last_successful_pointer_read
            .lock()
            .unwrap()
            .map(|ts| ts.timestamp())
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Relaxed)
    }

    /// Attaches a hook invoked with the outcome's static label
    /// (`"ssm"`/`"load"`/`"validation"`) whenever a poll cycle ends in an
    /// error, so an external metrics sink can track `errors_total{type}`
    /// without the Watcher depending on any particular metrics crate.
    pub fn with_error_hook(mut self, hook: impl Fn(&'static str) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(hook);
        self
    }

    /// Attaches a hook invoked with the seconds elapsed fetching, verifying,
    /// and extracting a bundle, on every `loader.load()` call that reaches a
    /// terminal outcome (swap or load error), so an external metrics sink
    /// can populate `bundle_load_seconds` without the Watcher depending on
    /// any particular metrics crate.
    pub fn with_load_timer(mut self, hook: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_load_duration = Box::new(hook);
        self
    }

    fn next_interval(&self) -> Duration {
        let base = self.config.effective_interval();
        let consecutive_errs = self.consecutive_errs.load(Ordering::Relaxed);
        if consecutive_errs == 0 {
            return base;
        }
        let multiplier = 2u32.saturating_pow(consecutive_errs);
        base.saturating_mul(multiplier).min(self.config.max_backoff)
    }

    fn check_staleness(&self, now: DateTime<Utc>) {
        let last_read = *self.last_successful_pointer_read.lock().unwrap();
        let stale_now = match last_read {
            Some(last_read) => {
                let elapsed = now.signed_duration_since(last_read);
                elapsed.to_std().unwrap_or(Duration::ZERO) > self.config.stale_threshold
            }
            None => false,
        };
        let was_stale = self.stale.swap(stale_now, Ordering::Relaxed);
        if stale_now && !was_stale {
            error!("watcher has not read the pointer successfully within the staleness threshold");
        } else if !stale_now && was_stale {
            info!("watcher pointer reads have recovered from staleness");
        }
    }

    /// Runs a single poll cycle: fetch pointer, compare, load+validate+swap
    /// on change. Returns the outcome for logging/testing.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> PollOutcome {
        self.poll_count.fetch_add(1, Ordering::Relaxed);

        let pointer = match self.loader.fetch_pointer(cancel).await {
            Ok(pointer) => pointer,
            Err(e) => {
                self.consecutive_errs.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "pointer read failed");
                self.check_staleness(Utc::now());
                (self.on_error)("ssm");
                return PollOutcome::SsmError;
            }
        };

        *self.last_successful_pointer_read.lock().unwrap() = Some(Utc::now());
        self.check_staleness(Utc::now());

        let current = self.current_hash.lock().unwrap().clone();
        if let Some(current) = &current {
            if hash_equal(&pointer.digest, current) {
                self.reset_backoff();
                return PollOutcome::NoChange;
            }
        }

        let load_started = Instant::now();
        let snapshot = match self.loader.load(&pointer, cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                (self.on_load_duration)(load_started.elapsed().as_secs_f64());
                self.reset_backoff();
                error!(error = %e, "bundle load failed");
                (self.on_error)("load");
                return PollOutcome::LoadError;
            }
        };
        (self.on_load_duration)(load_started.elapsed().as_secs_f64());

        if let Err(e) = validate(&snapshot, self.config.validate_opts) {
            self.reset_backoff();
            error!(error = %e, "bundle validation failed");
            (self.on_error)("validation");
            return PollOutcome::ValidationError;
        }

        let version = snapshot.content_version().map(str::to_string);
        self.store.set(snapshot);
        *self.current_hash.lock().unwrap() = Some(pointer.digest.clone());
        self.swap_count.fetch_add(1, Ordering::Relaxed);
        self.reset_backoff();

        let hash = pointer.digest.clone();
        let version_ref = version.as_deref();
        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.on_swap)(&hash, version_ref);
        })) {
            error!(?panic, "on_swap callback panicked; swallowed");
        }

        PollOutcome::Swapped
    }

    fn reset_backoff(&self) {
        if self.consecutive_errs.swap(0, Ordering::Relaxed) > 0 {
            info!("pointer reads recovered; backoff reset to base interval");
        }
    }

    /// Runs the poll loop until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let interval = self.next_interval();
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("watcher stopping: root context cancelled");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            if cancel.is_cancelled() {
                return;
            }
            let outcome = self.poll_once(&cancel).await;
            tracing::debug!(?outcome, "poll cycle complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contentnode_core_loader::LoaderConfig;
    use contentnode_core_verify::Verifier;
    use contentnode_domain_hash::HashAlgorithm;
    use contentnode_infra_ports::{
        KeyServiceError, ObjectStoreError, ParameterStoreError,
    };
    use futures::stream::BoxStream;
    use std::sync::Mutex as StdMutex;

    struct FakePointerStore {
        value: StdMutex<String>,
    }

    #[async_trait]
    impl ParameterStore for FakePointerStore {
        async fn get(&self, _key: &str, _cancel: &CancellationToken) -> Result<String, ParameterStoreError> {
            Ok(self.value.lock().unwrap().clone())
        }
    }

    struct FailingPointerStore;

    #[async_trait]
    impl ParameterStore for FailingPointerStore {
        async fn get(&self, key: &str, _cancel: &CancellationToken) -> Result<String, ParameterStoreError> {
            Err(ParameterStoreError::NotFound(key.to_string()))
        }
    }

    struct EmptyObjectStore;

    #[async_trait]
    impl ObjectStore for EmptyObjectStore {
        async fn get_stream(
            &self,
            key: &str,
            _cancel: &CancellationToken,
        ) -> Result<BoxStream<'static, Result<bytes::Bytes, ObjectStoreError>>, ObjectStoreError> {
            Err(ObjectStoreError::NotFound(key.to_string()))
        }
    }

    struct EmptyKeyService;

    #[async_trait]
    impl KeyService for EmptyKeyService {
        async fn fetch_public_key_der(
            &self,
            key_name: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>, KeyServiceError> {
            Err(KeyServiceError::NotFound(key_name.to_string()))
        }
    }

    fn noop_loader() -> Arc<Loader<FakePointerStore, EmptyObjectStore, EmptyKeyService>> {
        Arc::new(Loader::new(
            Arc::new(FakePointerStore {
                value: StdMutex::new("sha256:none".to_string()),
            }),
            Arc::new(EmptyObjectStore),
            Arc::new(Verifier::new(Arc::new(EmptyKeyService))),
            LoaderConfig::default(),
        ))
    }

    #[tokio::test]
    async fn reports_ssm_error_and_backs_off_on_pointer_failure() {
        let loader = Arc::new(Loader::new(
            Arc::new(FailingPointerStore),
            Arc::new(EmptyObjectStore),
            Arc::new(Verifier::new(Arc::new(EmptyKeyService))),
            LoaderConfig::default(),
        ));
        let store = Arc::new(Store::new());
        let watcher = Watcher::new(loader, store, WatcherConfig::default(), |_, _| {});
        let cancel = CancellationToken::new();

        let outcome = watcher.poll_once(&cancel).await;
        assert_eq!(outcome, PollOutcome::SsmError);
        assert_eq!(watcher.next_interval(), watcher.config.effective_interval() * 2);
    }

    #[tokio::test]
    async fn no_change_when_pointer_matches_seeded_hash() {
        let store = Arc::new(Store::new());
        let loader = Arc::new(Loader::new(
            Arc::new(FakePointerStore {
                value: StdMutex::new(format!("sha256:{}", "a".repeat(64))),
            }),
            Arc::new(EmptyObjectStore),
            Arc::new(Verifier::new(Arc::new(EmptyKeyService))),
            LoaderConfig::default(),
        ));

        let seed_fs = {
            let mut fs = contentnode_domain_model::FileTree::new();
            fs.insert(
                contentnode_domain_model::RelPath::new("index.html").unwrap(),
                contentnode_domain_model::FileEntry {
                    bytes: std::sync::Arc::from(b"hi".to_vec().into_boxed_slice()),
                    mode: 0o644,
                },
            );
            fs
        };
        let seed_meta = contentnode_domain_model::SnapshotMeta {
            hash_algorithm: HashAlgorithm::Sha256,
            hash: "a".repeat(64),
            source: contentnode_domain_model::SnapshotSource::Seed,
            verified_at: Utc::now(),
            loaded_at: None,
            version: None,
        };
        store.set(contentnode_domain_model::Snapshot::new(seed_fs, seed_meta, None));

        let watcher = Watcher::new(loader, store, WatcherConfig::default(), |_, _| {});
        let cancel = CancellationToken::new();
        let outcome = watcher.poll_once(&cancel).await;
        assert_eq!(outcome, PollOutcome::NoChange);
        assert_eq!(watcher.swap_count(), 0);
    }

    #[tokio::test]
    async fn on_swap_panic_is_caught_and_swallowed() {
        let watcher = Watcher::new(noop_loader(), Arc::new(Store::new()), WatcherConfig::default(), |_, _| {
            panic!("boom");
        });
        // Directly exercise the panic boundary the way poll_once does.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (watcher.on_swap)("hash", None);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn backoff_caps_at_configured_maximum() {
        let config = WatcherConfig {
            interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            validate_opts: ValidateOptions::default(),
        };
        let watcher = Watcher::new(noop_loader(), Arc::new(Store::new()), config, |_, _| {});
        watcher.consecutive_errs.store(10, Ordering::Relaxed);
        assert_eq!(watcher.next_interval(), Duration::from_secs(10));
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let config = WatcherConfig {
            interval: Duration::ZERO,
            ..WatcherConfig::default()
        };
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
    }

    // End-to-end scenarios driven against a real Loader (real gzip+tar
    // extraction, real ECDSA signature verification) backed
    // by in-memory fakes of the three external collaborators.
    mod end_to_end {
        use super::*;
        use contentnode_core_loader::LoaderConfig;
        use contentnode_core_verify::Verifier;
        use contentnode_domain_hash::{hash, HashAlgorithm};
        use contentnode_domain_model::Pointer;
        use contentnode_infra_ports::{KeyServiceError, ObjectStoreError, ParameterStoreError};
        use futures::stream;
        use p256::ecdsa::signature::Signer;
        use p256::ecdsa::{Signature, SigningKey};
        use pkcs8::EncodePublicKey;
        use std::collections::HashMap;
        use std::io::Write;
        use std::sync::Mutex as StdMutex;

        struct SharedPointerStore {
            value: StdMutex<String>,
        }

        #[async_trait]
        impl ParameterStore for SharedPointerStore {
            async fn get(&self, _key: &str, _cancel: &CancellationToken) -> Result<String, ParameterStoreError> {
                Ok(self.value.lock().unwrap().clone())
            }
        }

        struct SharedObjectStore {
            objects: StdMutex<HashMap<String, Vec<u8>>>,
        }

        #[async_trait]
        impl ObjectStore for SharedObjectStore {
            async fn get_stream(
                &self,
                key: &str,
                _cancel: &CancellationToken,
            ) -> Result<BoxStream<'static, Result<bytes::Bytes, ObjectStoreError>>, ObjectStoreError> {
                let objects = self.objects.lock().unwrap();
                let bytes = objects
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
                Ok(Box::pin(stream::iter(vec![Ok(bytes::Bytes::from(bytes))])))
            }
        }

        struct StaticKeyService {
            der: Vec<u8>,
        }

        #[async_trait]
        impl KeyService for StaticKeyService {
            async fn fetch_public_key_der(
                &self,
                _key_name: &str,
                _cancel: &CancellationToken,
            ) -> Result<Vec<u8>, KeyServiceError> {
                Ok(self.der.clone())
            }
        }

        fn build_tarball(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
            let mut builder = tar::Builder::new(Vec::new());
            for (name, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_path(name).unwrap();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, content).unwrap();
            }
            let tar_bytes = builder.into_inner().unwrap();
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&tar_bytes).unwrap();
            encoder.finish().unwrap()
        }

        fn sign_blob_bundle(signing_key: &SigningKey, artifact: &[u8]) -> Vec<u8> {
            let signature: Signature = signing_key.sign(artifact);
            let digest = hash(artifact, HashAlgorithm::Sha256);
            serde_json::json!({
                "blob": {
                    "digest_algorithm": "sha256",
                    "digest": digest,
                    "signature": base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        signature.to_der().as_bytes(),
                    ),
                }
            })
            .to_string()
            .into_bytes()
        }

        fn harness() -> (
            Arc<SharedPointerStore>,
            Arc<SharedObjectStore>,
            SigningKey,
            Vec<u8>,
        ) {
            let signing_key = SigningKey::random(&mut rand_core::OsRng);
            let der = signing_key.verifying_key().to_public_key_der().unwrap().to_vec();
            let pointer_store = Arc::new(SharedPointerStore {
                value: StdMutex::new(String::new()),
            });
            let object_store = Arc::new(SharedObjectStore {
                objects: StdMutex::new(HashMap::new()),
            });
            (pointer_store, object_store, signing_key, der)
        }

        fn publish_bundle(
            pointer_store: &SharedPointerStore,
            object_store: &SharedObjectStore,
            signing_key: &SigningKey,
            entries: Vec<(&str, &[u8])>,
        ) -> String {
            let tarball = build_tarball(entries);
            let bundle = sign_blob_bundle(signing_key, &tarball);
            let digest = hash(&tarball, HashAlgorithm::Sha256);
            let pointer = Pointer {
                algorithm: HashAlgorithm::Sha256,
                digest: digest.clone(),
            };
            object_store
                .objects
                .lock()
                .unwrap()
                .insert(pointer.object_key(None), tarball);
            object_store
                .objects
                .lock()
                .unwrap()
                .insert(pointer.signature_key(None), bundle);
            *pointer_store.value.lock().unwrap() = format!("sha256:{digest}");
            digest
        }

        /// Badly-signed bundle: tarball content is real, but the signature
        /// bundle is produced with a different private key than the one
        /// the `KeyService` serves.
        fn publish_bundle_wrong_key(
            pointer_store: &SharedPointerStore,
            object_store: &SharedObjectStore,
            entries: Vec<(&str, &[u8])>,
        ) -> String {
            let wrong_key = SigningKey::random(&mut rand_core::OsRng);
            publish_bundle(pointer_store, object_store, &wrong_key, entries)
        }

        fn make_watcher(
            pointer_store: Arc<SharedPointerStore>,
            object_store: Arc<SharedObjectStore>,
            der: Vec<u8>,
            swaps: Arc<StdMutex<Vec<(String, Option<String>)>>>,
        ) -> Watcher<SharedPointerStore, SharedObjectStore, StaticKeyService> {
            let loader = Arc::new(Loader::new(
                pointer_store,
                object_store,
                Arc::new(Verifier::new(Arc::new(StaticKeyService { der }))),
                LoaderConfig::default(),
            ));
            Watcher::new(loader, Arc::new(Store::new()), WatcherConfig::default(), move |hash, version| {
                swaps.lock().unwrap().push((hash.to_string(), version.map(str::to_string)));
            })
        }

        #[tokio::test]
        async fn pointer_flip_triggers_exactly_one_swap() {
            let (pointer_store, object_store, signing_key, der) = harness();
            let first_digest = publish_bundle(&pointer_store, &object_store, &signing_key, vec![("index.html", b"v1")]);

            let swaps = Arc::new(StdMutex::new(Vec::new()));
            let watcher = make_watcher(pointer_store.clone(), object_store.clone(), der, swaps.clone());
            let cancel = CancellationToken::new();

            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::Swapped);
            assert_eq!(watcher.swap_count(), 1);

            let second_digest =
                publish_bundle(&pointer_store, &object_store, &signing_key, vec![("index.html", b"v2")]);
            assert_ne!(first_digest, second_digest);

            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::Swapped);
            assert_eq!(watcher.swap_count(), 2);

            let recorded = swaps.lock().unwrap();
            assert_eq!(recorded.len(), 2);
            assert_eq!(recorded[1].0, second_digest);
        }

        #[tokio::test]
        async fn validation_rejects_a_swap_and_keeps_current_snapshot() {
            let (pointer_store, object_store, signing_key, der) = harness();
            publish_bundle(&pointer_store, &object_store, &signing_key, vec![("index.html", b"v1")]);

            let swaps = Arc::new(StdMutex::new(Vec::new()));
            let loader = Arc::new(Loader::new(
                pointer_store.clone(),
                object_store.clone(),
                Arc::new(Verifier::new(Arc::new(StaticKeyService { der }))),
                LoaderConfig::default(),
            ));
            let store = Arc::new(Store::new());
            let watcher = Watcher::new(loader, store.clone(), WatcherConfig::default(), {
                let swaps = swaps.clone();
                move |hash, version| swaps.lock().unwrap().push((hash.to_string(), version.map(str::to_string)))
            });
            let cancel = CancellationToken::new();

            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::Swapped);
            let original_hash = store.content_hash();

            // Next bundle lacks index.html, so it fails validation.
            publish_bundle(&pointer_store, &object_store, &signing_key, vec![("style.css", b"body{}")]);
            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::ValidationError);

            assert_eq!(watcher.swap_count(), 1);
            assert_eq!(store.content_hash(), original_hash);
            assert_eq!(swaps.lock().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn signature_mismatch_maps_to_load_error_and_keeps_current_snapshot() {
            let (pointer_store, object_store, signing_key, der) = harness();
            publish_bundle(&pointer_store, &object_store, &signing_key, vec![("index.html", b"v1")]);

            let swaps = Arc::new(StdMutex::new(Vec::new()));
            let watcher = make_watcher(pointer_store.clone(), object_store.clone(), der, swaps.clone());
            let cancel = CancellationToken::new();

            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::Swapped);

            publish_bundle_wrong_key(&pointer_store, &object_store, vec![("index.html", b"v2-forged")]);
            let outcome = watcher.poll_once(&cancel).await;
            assert_eq!(outcome, PollOutcome::LoadError);
            assert_eq!(watcher.swap_count(), 1);
        }

        #[tokio::test]
        async fn outage_then_recovery_follows_the_backoff_formula_and_resets() {
            let pointer_store = Arc::new(FailingPointerStore);
            let watcher = Watcher::new(
                Arc::new(Loader::new(
                    pointer_store,
                    Arc::new(EmptyObjectStore),
                    Arc::new(Verifier::new(Arc::new(EmptyKeyService))),
                    LoaderConfig::default(),
                )),
                Arc::new(Store::new()),
                WatcherConfig::default(),
                |_, _| {},
            );
            let cancel = CancellationToken::new();
            let base = watcher.config.effective_interval();

            for expected_errs in 1..=3u32 {
                let outcome = watcher.poll_once(&cancel).await;
                assert_eq!(outcome, PollOutcome::SsmError);
                let expected_delay = base.saturating_mul(2u32.saturating_pow(expected_errs));
                assert_eq!(watcher.next_interval(), expected_delay.min(watcher.config.max_backoff));
            }
            assert_eq!(watcher.next_interval(), Duration::from_secs(30 * 8));
        }
    }
}
