//! Lifecycle Controller: the application's composition root. Owns the
//! concrete adapters, the admin/public axum routers, the Watcher task,
//! and the signal-driven startup/shutdown sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use contentnode_core_loader::{Loader, LoaderConfig};
use contentnode_core_ready::{all, snapshot_probe, always_ready, DrainGate};
use contentnode_core_store::Store;
use contentnode_core_verify::Verifier;
use contentnode_core_watch::Watcher;
use contentnode_infra_adapters::{HttpKeyService, HttpObjectStore, HttpParameterStore, SdNotifyNotifier};
use contentnode_infra_ports::ReadyNotifier;
use contentnode_shared_telemetry::metrics::{ErrorLabels, ErrorType, Metrics};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::fallback;
use crate::handlers::{admin, public, AppState};

/// Starts every subordinate component, blocks on termination signals,
/// then drains and shuts down in a fixed order.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let store = Arc::new(Store::new());
    if config.seed_embedded_fallback {
        if let Some(seed) = fallback::seed_snapshot() {
            info!("seeding store from embedded fallback tree");
            store.set(seed);
        }
    }

    let metrics = Arc::new(Metrics::new());

    let parameter_store = Arc::new(HttpParameterStore::new(config.parameter_store_url.clone()));
    let object_store = Arc::new(HttpObjectStore::new(
        config.object_store_url.clone(),
        Some(config.max_bundle_size),
    ));
    let key_service = Arc::new(HttpKeyService::new(config.key_service_url.clone()));
    let verifier = Arc::new(Verifier::new(key_service));

    let loader_config = LoaderConfig {
        parameter_key: config.parameter_key.clone(),
        object_prefix: config.object_prefix.clone(),
        signing_key_name: config.signing_key_name.clone(),
        max_bundle_size: config.max_bundle_size,
        extract_limits: contentnode_core_archive::ExtractLimits {
            max_single_file: config.max_single_file,
            max_total_extracted: config.max_total_extracted,
        },
    };
    let loader = Arc::new(Loader::new(parameter_store, object_store, verifier, loader_config));

    let root_cancel = CancellationToken::new();

    // Initial load. A failure here is logged and swallowed — the Gate
    // keeps the node not-ready until the Watcher's first successful poll.
    match loader.fetch_pointer(&root_cancel).await {
        Ok(pointer) => {
            let load_started = Instant::now();
            let load_result = loader.load(&pointer, &root_cancel).await;
            metrics
                .bundle_load_seconds
                .observe(load_started.elapsed().as_secs_f64());
            match load_result {
                Ok(snapshot) => match contentnode_core_store::validate(&snapshot, config.validate_opts()) {
                    Ok(()) => {
                        info!(hash = %pointer.digest, "initial bundle load succeeded");
                        store.set(snapshot);
                    }
                    Err(e) => warn!(error = %e, "initial bundle failed validation; awaiting watcher"),
                },
                Err(e) => warn!(error = %e, "initial bundle load failed; awaiting watcher"),
            }
        }
        Err(e) => warn!(error = %e, "initial pointer read failed; awaiting watcher"),
    }

    let drain_gate = Arc::new(DrainGate::new());
    let readiness = Arc::new(all(vec![drain_gate.probe(), snapshot_probe(store.clone())]));
    let liveness = Arc::new(always_ready());

    let app_state = AppState {
        store: store.clone(),
        metrics: metrics.clone(),
        readiness: readiness.clone(),
        liveness,
    };

    let admin_router = Router::new()
        .route("/healthz", get(admin::healthz))
        .route("/readyz", get(admin::readyz))
        .route("/metrics", get(admin::metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let public_router = Router::new()
        .route("/", get(public::serve_root))
        .route("/.well-known/content-provenance", get(public::provenance))
        .route("/*path", get(public::serve_path))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let admin_listener = TcpListener::bind(config.admin_bind).await?;
    let public_listener = TcpListener::bind(config.public_bind).await?;
    info!(admin = %config.admin_bind, public = %config.public_bind, "HTTP surfaces bound");

    let admin_cancel = root_cancel.clone();
    let admin_server = tokio::spawn(async move {
        axum::serve(admin_listener, admin_router)
            .with_graceful_shutdown(admin_cancel.cancelled_owned())
            .await
    });

    let public_cancel = root_cancel.clone();
    let public_server = tokio::spawn(async move {
        axum::serve(public_listener, public_router)
            .with_graceful_shutdown(public_cancel.cancelled_owned())
            .await
    });

    let watcher_metrics = metrics.clone();
    let error_metrics = metrics.clone();
    let duration_metrics = metrics.clone();
    let watcher = Arc::new(
        Watcher::new(
            loader,
            store,
            config.watcher_config(),
            move |hash, version| {
                info!(hash, version, "snapshot swapped");
                watcher_metrics.swaps_total.inc();
            },
        )
        .with_error_hook(move |kind| {
            let label = match kind {
                "ssm" => ErrorType::Ssm,
                "load" => ErrorType::Load,
                _ => ErrorType::Validation,
            };
            error_metrics
                .errors_total
                .get_or_create(&error_label(label))
                .inc();
        })
        .with_load_timer(move |secs| {
            duration_metrics.bundle_load_seconds.observe(secs);
        }),
    );
    let watcher_cancel = root_cancel.clone();
    let watcher_handle = tokio::spawn(watcher.clone().run(watcher_cancel));

    let gauge_metrics = metrics.clone();
    let gauge_watcher = watcher.clone();
    let gauge_cancel = root_cancel.clone();
    let mut last_poll_count: u64 = 0;
    let gauge_sync = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = gauge_cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
            let polls = gauge_watcher.poll_count();
            gauge_metrics.polls_total.inc_by(polls.saturating_sub(last_poll_count));
            last_poll_count = polls;
            gauge_metrics
                .watcher_stale
                .set(if gauge_watcher.is_stale() { 1 } else { 0 });
            if let Some(ts) = gauge_watcher.last_success_unix() {
                gauge_metrics.watcher_last_success_unix.set(ts);
            }
        }
    });

    SdNotifyNotifier.notify_ready();
    info!("content-node is running");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received; closing readiness gate");
    drain_gate.close();

    let drain = config.drain_interval();
    tokio::select! {
        _ = tokio::time::sleep(drain) => {
            info!(seconds = drain.as_secs(), "drain interval elapsed");
        }
        _ = wait_for_second_signal() => {
            info!("second shutdown signal received; skipping remainder of drain");
        }
    }

    root_cancel.cancel();

    let deadline = config.shutdown_deadline();
    shutdown_with_deadline("public HTTP surface", public_server, deadline).await;
    shutdown_with_deadline("admin HTTP surface", admin_server, deadline).await;

    let _ = watcher_handle.await;
    let _ = gauge_sync.await;

    info!("content-node shutdown complete");
    Ok(())
}

async fn shutdown_with_deadline(
    name: &str,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
    deadline: Duration,
) {
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(Ok(()))) => info!(surface = name, "shut down cleanly"),
        Ok(Ok(Err(e))) => warn!(surface = name, error = %e, "shut down with an error"),
        Ok(Err(e)) => warn!(surface = name, error = %e, "server task panicked"),
        Err(_) => warn!(surface = name, seconds = deadline.as_secs(), "shutdown deadline exceeded; abandoning"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(unix)]
async fn wait_for_second_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_second_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn error_label(kind: ErrorType) -> ErrorLabels {
    ErrorLabels { r#type: kind }
}
