//! Validator: gatekeeper checks a freshly loaded `Snapshot` must pass
//! before the Watcher is allowed to publish it.

use contentnode_domain_model::Snapshot;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    pub min_files: usize,
    pub require_manifest: bool,
    pub require_manifest_hash_match: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            min_files: 1,
            require_manifest: false,
            require_manifest_hash_match: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("snapshot filesystem is empty")]
    EmptyFilesystem,
    #[error("index.html is missing or empty")]
    MissingIndex,
    #[error("regular file count is below the configured minimum")]
    TooFewFiles,
    #[error("manifest is required but absent")]
    ManifestRequired,
    #[error("manifest content_hash disagrees with the verified download hash")]
    ManifestHashMismatch,
}

/// Runs every check in order, failing fast on the first violation.
pub fn validate(snapshot: &Snapshot, opts: ValidateOptions) -> Result<(), ValidationError> {
    if snapshot.fs().is_empty() {
        return Err(ValidationError::EmptyFilesystem);
    }

    match snapshot.file("index.html") {
        Some(entry) if !entry.is_empty() => {}
        _ => return Err(ValidationError::MissingIndex),
    }

    if opts.min_files > 0 && snapshot.regular_file_count() < opts.min_files {
        return Err(ValidationError::TooFewFiles);
    }

    if opts.require_manifest && snapshot.manifest.is_none() {
        return Err(ValidationError::ManifestRequired);
    }

    if opts.require_manifest_hash_match {
        if let Some(manifest) = &snapshot.manifest {
            let store_hash = snapshot.meta.hash.as_str();
            let manifest_hash = manifest.content_hash.as_deref().unwrap_or("");
            if !store_hash.is_empty()
                && !manifest_hash.is_empty()
                && !contentnode_domain_hash::hash_equal(store_hash, manifest_hash)
            {
                return Err(ValidationError::ManifestHashMismatch);
            }
        }
    }

    Ok(())
}
