//! blake3 content digest for the `blake3` metadata field.

use anyhow::Context;
use memmap2::Mmap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::Result;
use crate::utils::config::HashingConsts;

/// Digest of a file's contents. Files above the mmap threshold are mapped, the rest streamed.
pub fn content_digest(path: &Path, size: u64) -> Result<blake3::Hash> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        // SAFETY: read-only map, dropped before returning.
        let map = unsafe { Mmap::map(&file) }.context("map file")?;
        hasher.update(&map);
    } else {
        let reader = BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        hasher.update_reader(reader).context("read file")?;
    }
    Ok(hasher.finalize())
}
