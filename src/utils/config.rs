//! Application configuration: defaults, tuning constants and the typed config sections.
//! Loading and layering (file, env, CLI) lives in [`super::metafiler_toml`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::LiveDispatch;
use crate::errors::MetafilerError;
use crate::utils::fd_limit::max_workers_by_fd_limit;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    db_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!("{pkg}.toml"),
                db_filename: format!("{pkg}.db"),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    /// Environment variable name for an override key, e.g. `METAFILER_DATABASE`.
    pub fn env_var(&self, key: &str) -> String {
        format!("{}_{}", self.env_prefix, key.to_uppercase())
    }
}

// ---- Worker / pool sizing ----

/// CPU-derived defaults for pool sizes.
#[derive(Clone, Copy, Debug)]
pub struct CpuDefaults {
    /// Available threads (from rayon).
    pub all_threads: usize,
}

impl CpuDefaults {
    /// Indexing workers per core.
    pub const WORKERS_PER_CORE: usize = 2;

    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads().max(1),
        }
    }

    /// 2 x cores, capped by the open-file limit left over after the storage pool.
    pub fn workers(&self) -> usize {
        let wanted = self.all_threads * Self::WORKERS_PER_CORE;
        match max_workers_by_fd_limit(self.storage_pool_size()) {
            Some(fd_cap) if fd_cap < wanted => {
                log::debug!("Capping workers {} -> {} (open-file limit)", wanted, fd_cap);
                fd_cap
            }
            _ => wanted,
        }
    }

    pub fn storage_pool_size(&self) -> usize {
        self.all_threads
    }
}

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}

// ---- Pipeline ----

/// Registration queue capacity when not configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

// ---- Storage ----

pub const DEFAULT_COLLECTION: &str = "doc";
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
/// Per-call timeouts below this are raised to it.
pub const MIN_TIMEOUT_MS: u64 = 1000;

// ---- Sections ----

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub filesystem: FilesystemConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub indexer: IndexerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Root of the watched tree.
    pub path: PathBuf,
    pub recursive: bool,
    pub file_includes: Vec<String>,
    pub file_excludes: Vec<String>,
    pub directory_includes: Vec<String>,
    pub directory_excludes: Vec<String>,
    /// Log every dispatched message at info.
    pub log_events: bool,
    pub skip_initial_scan: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            recursive: true,
            file_includes: Vec::new(),
            file_excludes: Vec::new(),
            directory_includes: Vec::new(),
            directory_excludes: Vec::new(),
            log_events: false,
            skip_initial_scan: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max concurrently running indexing tasks.
    pub workers: usize,
    /// Registration queue capacity (walker → dispatcher).
    pub queue_capacity: usize,
    pub live_dispatch: LiveDispatch,
    /// Exit once the initial scan is drained instead of watching. CLI only.
    #[serde(skip)]
    pub run_once: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: CpuDefaults::current().workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            live_dispatch: LiveDispatch::default(),
            run_once: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Table holding the documents.
    pub collection: String,
    pub pool_size: usize,
    pub timeout_ms: u64,
    /// Drop all previously indexed documents at startup.
    pub drop_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(PackagePaths::get().db_filename()),
            collection: DEFAULT_COLLECTION.to_string(),
            pool_size: CpuDefaults::current().storage_pool_size(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            drop_on_start: false,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MIN_TIMEOUT_MS))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Keep only these fields (all when empty).
    pub field_includes: Vec<String>,
    pub field_excludes: Vec<String>,
    /// `old=new` pairs.
    pub field_renames: Vec<String>,
    /// Add a blake3 content hash to each record.
    pub hash: bool,
}

impl Config {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), MetafilerError> {
        if self.pipeline.workers == 0 {
            return Err(MetafilerError::Config("pipeline.workers must be > 0".into()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(MetafilerError::Config(
                "pipeline.queue_capacity must be > 0".into(),
            ));
        }
        if self.storage.pool_size == 0 {
            return Err(MetafilerError::Config(
                "storage.pool_size must be > 0".into(),
            ));
        }
        if !is_valid_collection_name(&self.storage.collection) {
            return Err(MetafilerError::Config(format!(
                "storage.collection {:?} must start with a letter or '_' and hold only ASCII alphanumerics or '_'",
                self.storage.collection
            )));
        }
        for rename in &self.indexer.field_renames {
            if parse_rename(rename).is_none() {
                return Err(MetafilerError::Config(format!(
                    "indexer.field_renames entry {rename:?} is not of the form old=new"
                )));
            }
        }
        Ok(())
    }
}

/// Collection names end up in SQL as identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Split an `old=new` rename rule.
pub fn parse_rename(rule: &str) -> Option<(&str, &str)> {
    let (old, new) = rule.split_once('=')?;
    let (old, new) = (old.trim(), new.trim());
    (!old.is_empty() && !new.is_empty()).then_some((old, new))
}
