//! Shared data model for the content bundle supply chain: the verified,
//! extracted `Snapshot` and the types that compose it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contentnode_domain_hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cleaned, relative path inside an extracted bundle.
///
/// Constructing one enforces the no-absolute-paths, no-`.`/`..`-segment
/// invariant. Downstream code that only ever holds a `RelPath` cannot
/// violate it by construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelPath(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelPathError {
    #[error("path is absolute")]
    Absolute,
    #[error("path contains a '..' or '.' segment")]
    Traversal,
    #[error("path is empty")]
    Empty,
}

impl RelPath {
    pub fn new(raw: &str) -> Result<Self, RelPathError> {
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(RelPathError::Absolute);
        }
        if raw.is_empty() {
            return Err(RelPathError::Empty);
        }
        for segment in raw.split(['/', '\\']) {
            if segment == ".." || segment == "." {
                return Err(RelPathError::Traversal);
            }
        }
        Ok(RelPath(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single extracted regular file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub bytes: Arc<[u8]>,
    pub mode: u32,
}

impl FileEntry {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The in-memory file tree produced by the Archive Extractor.
pub type FileTree = BTreeMap<RelPath, FileEntry>;

/// Where a snapshot's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotSource {
    Seed,
    ObjectStore,
    Unknown,
}

/// The opaque-to-the-core bundle manifest, `provenance.json` in the
/// extracted tree. Only `version` and `content_hash` are interpreted by
/// the core; everything else is round-tripped as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Option<String>,
    pub content_id: Option<String>,
    pub content_hash: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Metadata attached to a `Snapshot` describing its verified provenance.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub hash_algorithm: HashAlgorithm,
    pub hash: String,
    pub source: SnapshotSource,
    pub verified_at: DateTime<Utc>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

/// An immutable, verified, extracted content bundle.
///
/// Once constructed a `Snapshot` never changes: every field is either
/// `Copy`, owned-and-never-mutated, or behind an `Arc`. Cloning a
/// `Snapshot` is cheap (the file tree is shared, not copied).
#[derive(Debug, Clone)]
pub struct Snapshot {
    fs: Arc<FileTree>,
    pub meta: SnapshotMeta,
    pub manifest: Option<Manifest>,
}

impl Snapshot {
    pub fn new(fs: FileTree, meta: SnapshotMeta, manifest: Option<Manifest>) -> Self {
        Self {
            fs: Arc::new(fs),
            meta,
            manifest,
        }
    }

    pub fn fs(&self) -> &FileTree {
        &self.fs
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        let rel = RelPath::new(path).ok()?;
        self.fs.get(&rel)
    }

    pub fn regular_file_count(&self) -> usize {
        self.fs.len()
    }

    /// Always the verified download hash, never the manifest's.
    pub fn content_hash(&self) -> &str {
        &self.meta.hash
    }

    /// Prefers the manifest's version when both are present.
    pub fn content_version(&self) -> Option<&str> {
        self.manifest
            .as_ref()
            .and_then(|m| m.version.as_deref())
            .or(self.meta.version.as_deref())
    }
}

/// The algorithm-prefixed hex digest read from the parameter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl Pointer {
    /// Deterministic object-store key for this pointer's tarball.
    pub fn object_key(&self, prefix: Option<&str>) -> String {
        match prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}/{}.tar.gz", prefix, self.algorithm, self.digest)
            }
            _ => format!("{}/{}.tar.gz", self.algorithm, self.digest),
        }
    }

    /// Deterministic object-store key for this pointer's signature bundle.
    pub fn signature_key(&self, prefix: Option<&str>) -> String {
        format!("{}.sigstore.json", self.object_key(prefix))
    }
}
