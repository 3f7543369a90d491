//! Archive Extractor: converts a gzip+tar byte buffer already held in
//! memory into an immutable in-memory file tree. Never touches the host
//! filesystem — the extracted tree outlives the source buffer on its own.

use std::io::Read;
use std::sync::Arc;

use contentnode_domain_model::{FileEntry, FileTree, RelPath};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed gzip or tar stream: {0}")]
    Malformed(String),
    #[error("entry declares an absolute path")]
    AbsolutePath,
    #[error("entry path contains a '..' traversal segment")]
    PathTraversal,
    #[error("entry exceeds the maximum single-file size")]
    OversizedEntry,
    #[error("cumulative extracted size exceeds the maximum total")]
    OversizedTotal,
    #[error("unsupported tar entry type: {0:?}")]
    UnsupportedEntryType(tar::EntryType),
}

/// Resource ceilings enforced while extracting.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub max_single_file: u64,
    pub max_total_extracted: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_single_file: 10 * 1024 * 1024,
            max_total_extracted: 100 * 1024 * 1024,
        }
    }
}

enum PathClass {
    Skip,
    Absolute,
    Traversal,
    Clean(String),
}

fn classify_path(raw: &str) -> PathClass {
    if raw.is_empty() || raw == "." {
        return PathClass::Skip;
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return PathClass::Absolute;
    }
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return PathClass::Traversal;
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        return PathClass::Skip;
    }
    PathClass::Clean(segments.join("/"))
}

/// Parses a gzip+tar byte buffer into an in-memory file tree.
pub fn extract(compressed: &[u8], limits: ExtractLimits) -> Result<FileTree, ArchiveError> {
    let decoder = flate2::read::GzDecoder::new(compressed);
    let mut archive = tar::Archive::new(decoder);

    let mut tree = FileTree::new();
    let mut total_extracted: u64 = 0;

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::Malformed(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        let entry_type = entry.header().entry_type();
        let raw_path = entry
            .path()
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?
            .to_string_lossy()
            .into_owned();

        match classify_path(&raw_path) {
            PathClass::Skip => {
                trace!(path = %raw_path, "skipping '.'/empty tar entry");
                continue;
            }
            PathClass::Absolute => return Err(ArchiveError::AbsolutePath),
            PathClass::Traversal => return Err(ArchiveError::PathTraversal),
            PathClass::Clean(cleaned) => {
                if entry_type.is_dir() {
                    continue;
                }
                if entry_type.as_byte() == b'V' {
                    // GNU "volume label" metadata entry; not real content.
                    continue;
                }
                if !entry_type.is_file() {
                    return Err(ArchiveError::UnsupportedEntryType(entry_type));
                }

                let declared_size = entry.header().size().unwrap_or(0);
                if declared_size > limits.max_single_file {
                    return Err(ArchiveError::OversizedEntry);
                }

                let cap = limits.max_single_file.saturating_add(1);
                let mut buf = Vec::with_capacity(declared_size.min(cap) as usize);
                entry
                    .by_ref()
                    .take(cap)
                    .read_to_end(&mut buf)
                    .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
                if buf.len() as u64 > limits.max_single_file {
                    return Err(ArchiveError::OversizedEntry);
                }

                total_extracted = total_extracted.saturating_add(buf.len() as u64);
                if total_extracted > limits.max_total_extracted {
                    return Err(ArchiveError::OversizedTotal);
                }

                let mode = entry.header().mode().unwrap_or(0o644);
                let rel_path = RelPath::new(&cleaned)
                    .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
                tree.insert(
                    rel_path,
                    FileEntry {
                        bytes: Arc::from(buf.into_boxed_slice()),
                        mode,
                    },
                );
            }
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tarball(entries: Vec<(&str, tar::EntryType, &[u8])>) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, kind, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(content.len() as u64);
            header.set_entry_type(kind);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, content).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn extracts_regular_files() {
        let archive = build_tarball(vec![
            ("index.html", tar::EntryType::Regular, b"<html></html>"),
            ("assets/app.js", tar::EntryType::Regular, b"console.log(1)"),
        ]);
        let tree = extract(&archive, ExtractLimits::default()).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get(&RelPath::new("index.html").unwrap()).unwrap().bytes.as_ref(),
            b"<html></html>"
        );
    }

    #[test]
    fn directory_entries_are_implicit() {
        let archive = build_tarball(vec![
            ("assets/", tar::EntryType::Directory, b""),
            ("assets/app.js", tar::EntryType::Regular, b"1"),
        ]);
        let tree = extract(&archive, ExtractLimits::default()).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.contains_key(&RelPath::new("assets/app.js").unwrap()));
    }

    #[test]
    fn dot_named_entry_is_skipped() {
        let archive = build_tarball(vec![
            (".", tar::EntryType::Directory, b""),
            ("index.html", tar::EntryType::Regular, b"hi"),
        ]);
        let tree = extract(&archive, ExtractLimits::default()).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn rejects_absolute_path() {
        let archive = build_tarball(vec![("/etc/passwd", tar::EntryType::Regular, b"x")]);
        let err = extract(&archive, ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::AbsolutePath));
    }

    #[test]
    fn rejects_path_traversal() {
        let archive = build_tarball(vec![("../../etc/shadow", tar::EntryType::Regular, b"x")]);
        let err = extract(&archive, ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal));
    }

    #[test]
    fn rejects_oversized_entry() {
        let content = vec![0u8; 16];
        let archive = build_tarball(vec![("big.bin", tar::EntryType::Regular, &content)]);
        let limits = ExtractLimits {
            max_single_file: 8,
            max_total_extracted: 1024,
        };
        let err = extract(&archive, limits).unwrap_err();
        assert!(matches!(err, ArchiveError::OversizedEntry));
    }

    #[test]
    fn rejects_oversized_total() {
        let archive = build_tarball(vec![
            ("a.bin", tar::EntryType::Regular, &[0u8; 8]),
            ("b.bin", tar::EntryType::Regular, &[0u8; 8]),
        ]);
        let limits = ExtractLimits {
            max_single_file: 8,
            max_total_extracted: 12,
        };
        let err = extract(&archive, limits).unwrap_err();
        assert!(matches!(err, ArchiveError::OversizedTotal));
    }

    #[test]
    fn rejects_symlink() {
        let archive = build_tarball(vec![("link", tar::EntryType::Symlink, b"")]);
        let err = extract(&archive, ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedEntryType(_)));
    }

    #[test]
    fn rejects_hard_link() {
        let archive = build_tarball(vec![("link", tar::EntryType::Link, b"")]);
        let err = extract(&archive, ExtractLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedEntryType(_)));
    }

    #[test]
    fn rejects_device_and_fifo_entries() {
        for kind in [
            tar::EntryType::Char,
            tar::EntryType::Block,
            tar::EntryType::Fifo,
        ] {
            let archive = build_tarball(vec![("dev", kind, b"")]);
            let err = extract(&archive, ExtractLimits::default()).unwrap_err();
            assert!(matches!(err, ArchiveError::UnsupportedEntryType(_)));
        }
    }

    proptest::proptest! {
        #[test]
        fn round_trip_preserves_safe_files(
            names in proptest::collection::vec("[a-z][a-z0-9_]{0,12}", 1..5),
            content in proptest::collection::vec(proptest::collection::vec(0u8..255, 0..64), 1..5),
        ) {
            let len = names.len().min(content.len());
            let unique_names: Vec<String> = (0..len).map(|i| format!("{}_{}", names[i], i)).collect();
            let mut entries = Vec::new();
            for i in 0..len {
                entries.push((unique_names[i].as_str(), tar::EntryType::Regular, content[i].as_slice()));
            }
            let archive = build_tarball(entries.clone());
            let tree = extract(&archive, ExtractLimits::default()).unwrap();
            for (name, _, data) in entries {
                let rel = RelPath::new(name).unwrap();
                if let Some(entry) = tree.get(&rel) {
                    proptest::prop_assert_eq!(entry.bytes.as_ref(), data);
                }
            }
        }
    }
}
