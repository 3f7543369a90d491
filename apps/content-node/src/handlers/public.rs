//! Public HTTP surface: the trivial serve-a-file handler and the
//! provenance JSON endpoint. Routing policy beyond "serve this path from
//! the active snapshot" is explicitly out of scope.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// `GET /` — serves `index.html` from the active snapshot.
pub async fn serve_root(state: State<AppState>) -> impl IntoResponse {
    serve_path(state, Path("index.html".to_string())).await
}

/// `GET /*path` — serves `path` from the active snapshot's filesystem.
/// 404s when the snapshot is absent or the path doesn't exist.
pub async fn serve_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let (snapshot, present) = state.store.get();
    if !present {
        return (StatusCode::NOT_FOUND, [("content-type", "text/plain")], Vec::new()).into_response();
    }
    let snapshot = snapshot.expect("present implies Some");

    let lookup = path.trim_start_matches('/');
    let lookup = if lookup.is_empty() { "index.html" } else { lookup };

    match snapshot.file(lookup) {
        Some(entry) => {
            let content_type = content_type_for(lookup);
            (
                StatusCode::OK,
                [("content-type", content_type)],
                entry.bytes.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, [("content-type", "text/plain")], Vec::new()).into_response(),
    }
}

#[derive(Serialize)]
struct ProvenanceResponse {
    hash_algorithm: String,
    hash: String,
    source: &'static str,
    verified_at: chrono::DateTime<chrono::Utc>,
    loaded_at: Option<chrono::DateTime<chrono::Utc>>,
    version: Option<String>,
    manifest: Option<serde_json::Value>,
}

/// `GET /.well-known/content-provenance` — dumps the active snapshot's
/// metadata and manifest as JSON.
pub async fn provenance(State(state): State<AppState>) -> impl IntoResponse {
    let (snapshot, present) = state.store.get();
    if !present {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({
            "error": "no active snapshot",
        })))
            .into_response();
    }
    let snapshot = snapshot.expect("present implies Some");

    let source = match snapshot.meta.source {
        contentnode_domain_model::SnapshotSource::Seed => "seed",
        contentnode_domain_model::SnapshotSource::ObjectStore => "object-store",
        contentnode_domain_model::SnapshotSource::Unknown => "unknown",
    };

    let body = ProvenanceResponse {
        hash_algorithm: snapshot.meta.hash_algorithm.as_str().to_string(),
        hash: snapshot.content_hash().to_string(),
        source,
        verified_at: snapshot.meta.verified_at,
        loaded_at: snapshot.meta.loaded_at,
        version: snapshot.content_version().map(str::to_string),
        manifest: snapshot
            .manifest
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok()),
    };

    (StatusCode::OK, Json(body)).into_response()
}
