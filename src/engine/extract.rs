//! Metadata extraction: the extractor seam used by indexing tasks, a default filesystem-level
//! extractor, and field include/exclude/rename post-processing.

use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::engine::hashing::content_digest;
use crate::errors::MetafilerError;
use crate::utils::config::{IndexerConfig, parse_rename};
use crate::{Metadata, Result};

/// Turns one file into a flat field map.
///
/// Implementations must not modify the filesystem. Failures should carry
/// [`MetafilerError::CannotIndex`] so callers can tell a bad file from a broken pipeline.
/// Extraction may be slow; it runs on the worker pool.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Metadata>;

    /// Release extractor resources at shutdown.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn cannot_index(path: &Path, cause: impl ToString) -> crate::Error {
    MetafilerError::CannotIndex {
        path: path.to_path_buf(),
        cause: cause.to_string(),
    }
    .into()
}

/// Default extractor: file name, extension, size, mtime and optionally a blake3 content hash.
#[derive(Clone, Debug, Default)]
pub struct FileInfoExtractor {
    pub with_hash: bool,
}

impl FileInfoExtractor {
    pub fn new(with_hash: bool) -> Self {
        Self { with_hash }
    }
}

impl MetadataExtractor for FileInfoExtractor {
    fn extract(&self, path: &Path) -> Result<Metadata> {
        let meta = std::fs::metadata(path).map_err(|e| cannot_index(path, e))?;
        if !meta.is_file() {
            return Err(cannot_index(path, "not a regular file"));
        }

        let mut out = Metadata::new();
        if let Some(name) = path.file_name() {
            out.insert("file_name".into(), name.to_string_lossy().into_owned());
        }
        if let Some(ext) = path.extension() {
            out.insert("extension".into(), ext.to_string_lossy().to_lowercase());
        }
        out.insert("size".into(), meta.len().to_string());
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        out.insert("modified".into(), mtime_ns.to_string());

        if self.with_hash {
            let digest = content_digest(path, meta.len()).map_err(|e| cannot_index(path, e))?;
            out.insert("blake3".into(), digest.to_hex().to_string());
        }
        Ok(out)
    }
}

/// Field post-processing: includes (when non-empty) keep only listed fields, excludes drop
/// fields, renames are applied last.
#[derive(Clone, Debug, Default)]
pub struct FieldFilter {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub renames: Vec<(String, String)>,
}

impl From<&IndexerConfig> for FieldFilter {
    fn from(cfg: &IndexerConfig) -> Self {
        FieldFilter {
            includes: cfg.field_includes.clone(),
            excludes: cfg.field_excludes.clone(),
            renames: cfg
                .field_renames
                .iter()
                .filter_map(|r| parse_rename(r))
                .map(|(old, new)| (old.to_string(), new.to_string()))
                .collect(),
        }
    }
}

impl FieldFilter {
    pub fn is_noop(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty() && self.renames.is_empty()
    }

    pub fn apply(&self, metadata: Metadata) -> Metadata {
        if self.is_noop() {
            return metadata;
        }
        metadata
            .into_iter()
            .filter(|(k, _)| self.includes.is_empty() || self.includes.contains(k))
            .filter(|(k, _)| !self.excludes.contains(k))
            .map(|(k, v)| {
                let key = self
                    .renames
                    .iter()
                    .find(|(old, _)| *old == k)
                    .map(|(_, new)| new.clone())
                    .unwrap_or(k);
                (key, v)
            })
            .collect()
    }
}

/// Wraps an extractor and runs its output through a [`FieldFilter`].
pub struct FilteredExtractor<E> {
    inner: E,
    filter: FieldFilter,
}

impl<E: MetadataExtractor> FilteredExtractor<E> {
    pub fn new(inner: E, filter: FieldFilter) -> Self {
        Self { inner, filter }
    }
}

impl<E: MetadataExtractor> MetadataExtractor for FilteredExtractor<E> {
    fn extract(&self, path: &Path) -> Result<Metadata> {
        self.inner.extract(path).map(|m| self.filter.apply(m))
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
