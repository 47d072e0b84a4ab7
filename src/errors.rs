//! Error taxonomy. Public functions return [`crate::Result`]; these are the root causes callers
//! can `downcast_ref` to tell startup failures from per-item ones.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MetafilerError {
    /// Root path missing at startup. Fatal.
    #[error("path not found: {0}")]
    UnreachablePath(PathBuf),

    /// Extraction failed for a single file. The item is skipped.
    #[error("cannot index path or file: {path} caused by: {cause}")]
    CannotIndex { path: PathBuf, cause: String },

    /// Subscribing (or unsubscribing) a directory watch failed.
    #[error("watch {path}: {cause}")]
    Watch { path: PathBuf, cause: String },

    /// One or more pooled connections could not be brought up. Fatal.
    #[error("storage pool startup failed ({failures} of {pool_size} connections): {first}")]
    StorageStartup {
        failures: usize,
        pool_size: usize,
        first: String,
    },

    /// Runtime upsert/delete failure. The item is dropped.
    #[error("storage {op} for {path}: {cause}")]
    Storage {
        op: &'static str,
        path: String,
        cause: String,
    },

    #[error("storage pool is closed")]
    PoolClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}
