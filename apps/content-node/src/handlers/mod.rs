//! HTTP handlers for the admin and public surfaces. The public surface's
//! routing policy and the admin surface's exposition format are kept
//! intentionally trivial; they only consume `Store::get` and the
//! readiness probe.

pub mod admin;
pub mod public;

use std::sync::Arc;

use contentnode_core_ready::Probe;
use contentnode_core_store::Store;
use contentnode_shared_telemetry::metrics::Metrics;

/// Shared state handed to every axum handler on both surfaces.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub metrics: Arc<Metrics>,
    pub readiness: Arc<Probe>,
    pub liveness: Arc<Probe>,
}
