//! Embedded fallback content: a small read-only tree baked into the
//! binary at compile time, used to seed the Store before the first
//! successful load so the public surface never serves a blank 404.

use std::sync::Arc;

use chrono::Utc;
use contentnode_domain_hash::{hash, HashAlgorithm};
use contentnode_domain_model::{FileEntry, FileTree, RelPath, Snapshot, SnapshotMeta, SnapshotSource};
use include_dir::{include_dir, Dir};

static FALLBACK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/fallback");

/// Builds a `Snapshot` from the embedded fallback tree, or `None` if the
/// tree doesn't carry an `index.html` (nothing worth seeding the Store
/// with).
pub fn seed_snapshot() -> Option<Snapshot> {
    let mut fs = FileTree::new();
    let mut all_bytes = Vec::new();
    collect(&FALLBACK_DIR, &mut fs, &mut all_bytes);

    if !fs.contains_key(&RelPath::new("index.html").ok()?) {
        return None;
    }

    let digest = hash(&all_bytes, HashAlgorithm::Sha256);
    let meta = SnapshotMeta {
        hash_algorithm: HashAlgorithm::Sha256,
        hash: digest,
        source: SnapshotSource::Seed,
        verified_at: Utc::now(),
        loaded_at: None,
        version: None,
    };
    Some(Snapshot::new(fs, meta, None))
}

fn collect(dir: &Dir, fs: &mut FileTree, all_bytes: &mut Vec<u8>) {
    for entry in dir.entries() {
        match entry {
            include_dir::DirEntry::Dir(sub) => collect(sub, fs, all_bytes),
            include_dir::DirEntry::File(file) => {
                let path = file.path().to_string_lossy().replace('\\', "/");
                if let Ok(rel) = RelPath::new(&path) {
                    all_bytes.extend_from_slice(file.contents());
                    fs.insert(
                        rel,
                        FileEntry {
                            bytes: Arc::from(file.contents().to_vec().into_boxed_slice()),
                            mode: 0o644,
                        },
                    );
                }
            }
        }
    }
}
