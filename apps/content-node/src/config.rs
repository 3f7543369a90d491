//! Configuration surface: CLI flags and environment variables, loaded
//! once at startup and handed to the Lifecycle Controller as validated
//! values.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use contentnode_core_store::ValidateOptions;
use contentnode_core_watch::WatcherConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "content-node",
    version,
    about = "Serves a signed, versioned content bundle with hot-swap and drain-aware shutdown."
)]
pub struct NodeConfig {
    /// Base URL of the parameter store HTTP facade.
    #[arg(long, env = "CONTENT_NODE_PARAMETER_STORE_URL")]
    pub parameter_store_url: String,

    /// Parameter-store key holding the `{algorithm}:{hex-digest}` pointer.
    #[arg(long, env = "CONTENT_NODE_PARAMETER_KEY", default_value = "content-bundle-pointer")]
    pub parameter_key: String,

    /// Base URL of the object store HTTP facade.
    #[arg(long, env = "CONTENT_NODE_OBJECT_STORE_URL")]
    pub object_store_url: String,

    /// Key prefix under which bundle objects are stored.
    #[arg(long, env = "CONTENT_NODE_OBJECT_PREFIX")]
    pub object_prefix: Option<String>,

    /// Base URL of the key service HTTP facade.
    #[arg(long, env = "CONTENT_NODE_KEY_SERVICE_URL")]
    pub key_service_url: String,

    /// Name of the public key used to verify bundle signatures.
    #[arg(long, env = "CONTENT_NODE_SIGNING_KEY_NAME", default_value = "content-signing-key")]
    pub signing_key_name: String,

    /// Maximum compressed tarball size in bytes.
    #[arg(long, env = "CONTENT_NODE_MAX_BUNDLE_SIZE", default_value_t = 50 * 1024 * 1024)]
    pub max_bundle_size: u64,

    /// Maximum size of a single extracted file in bytes.
    #[arg(long, env = "CONTENT_NODE_MAX_SINGLE_FILE", default_value_t = 10 * 1024 * 1024)]
    pub max_single_file: u64,

    /// Maximum cumulative extracted size in bytes.
    #[arg(long, env = "CONTENT_NODE_MAX_TOTAL_EXTRACTED", default_value_t = 100 * 1024 * 1024)]
    pub max_total_extracted: u64,

    /// Watcher poll interval in seconds.
    #[arg(long, env = "CONTENT_NODE_POLL_INTERVAL_SECONDS", default_value_t = 30)]
    pub poll_interval_seconds: u64,

    /// Maximum backoff interval in seconds.
    #[arg(long, env = "CONTENT_NODE_MAX_BACKOFF_SECONDS", default_value_t = 300)]
    pub max_backoff_seconds: u64,

    /// Staleness threshold in seconds.
    #[arg(long, env = "CONTENT_NODE_STALE_THRESHOLD_SECONDS", default_value_t = 1800)]
    pub stale_threshold_seconds: u64,

    /// Minimum regular file count a bundle must contain.
    #[arg(long, env = "CONTENT_NODE_MIN_FILES", default_value_t = 1)]
    pub min_files: usize,

    /// Reject bundles that do not carry a provenance.json manifest.
    #[arg(long, env = "CONTENT_NODE_REQUIRE_MANIFEST", default_value_t = false)]
    pub require_manifest: bool,

    /// Reject bundles whose manifest content_hash disagrees with the
    /// verified download hash.
    #[arg(long, env = "CONTENT_NODE_REQUIRE_MANIFEST_HASH_MATCH", default_value_t = true)]
    pub require_manifest_hash_match: bool,

    /// Interface the admin surface (health/ready/metrics) binds to.
    #[arg(long, env = "CONTENT_NODE_ADMIN_BIND", default_value = "127.0.0.1:9090")]
    pub admin_bind: SocketAddr,

    /// Interface the public surface binds to.
    #[arg(long, env = "CONTENT_NODE_PUBLIC_BIND", default_value = "0.0.0.0:8080")]
    pub public_bind: SocketAddr,

    /// Seconds the readiness gate reports draining before shutdown begins.
    #[arg(long, env = "CONTENT_NODE_DRAIN_SECONDS", default_value_t = 60)]
    pub drain_seconds: u64,

    /// Hard deadline in seconds for each HTTP surface's graceful shutdown.
    #[arg(long, env = "CONTENT_NODE_SHUTDOWN_DEADLINE_SECONDS", default_value_t = 10)]
    pub shutdown_deadline_seconds: u64,

    /// Seed the Store from the embedded fallback tree at startup.
    #[arg(long, env = "CONTENT_NODE_SEED_EMBEDDED_FALLBACK", default_value_t = true)]
    pub seed_embedded_fallback: bool,
}

impl NodeConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn validate_opts(&self) -> ValidateOptions {
        ValidateOptions {
            min_files: self.min_files,
            require_manifest: self.require_manifest,
            require_manifest_hash_match: self.require_manifest_hash_match,
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            interval: Duration::from_secs(self.poll_interval_seconds),
            max_backoff: Duration::from_secs(self.max_backoff_seconds),
            stale_threshold: Duration::from_secs(self.stale_threshold_seconds),
            validate_opts: self.validate_opts(),
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_seconds)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_seconds)
    }
}
