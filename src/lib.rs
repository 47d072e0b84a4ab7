//! Metafiler: watch a directory tree and keep a metadata document per file in SQLite.
//!
//! Startup walks the tree once (the initial scan) and then follows filesystem events. Each file
//! is run through a [`MetadataExtractor`](engine::MetadataExtractor) and upserted by path into
//! a [`StoragePool`](engine::StoragePool); deleted files are removed.

pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use errors::MetafilerError;

/// Result alias used by public metafiler API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
