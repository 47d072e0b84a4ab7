//! Path and filter utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::errors::MetafilerError;
use crate::utils::config::FilesystemConfig;

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => {
                // macOS resource forks and desktop trash dirs
                name.starts_with("._") || name.starts_with(".Trash-")
            }
        }
    } else {
        false
    }
}

/// Include/exclude globs for files and directories.
///
/// A pattern matches when it matches either the file name or the full path string. An empty
/// include list admits everything; excludes always win.
#[derive(Clone, Debug, Default)]
pub struct PathFilter {
    pub file_includes: Vec<String>,
    pub file_excludes: Vec<String>,
    pub directory_includes: Vec<String>,
    pub directory_excludes: Vec<String>,
    /// Files never indexed: the database and its `-wal`/`-shm`/`-journal` siblings.
    pub own_files: Vec<String>,
}

impl From<&FilesystemConfig> for PathFilter {
    fn from(fs: &FilesystemConfig) -> Self {
        PathFilter {
            file_includes: fs.file_includes.clone(),
            file_excludes: fs.file_excludes.clone(),
            directory_includes: fs.directory_includes.clone(),
            directory_excludes: fs.directory_excludes.clone(),
            own_files: Vec::new(),
        }
    }
}

impl PathFilter {
    /// True if the file at `path` should be indexed.
    pub fn accepts_file(&self, path: &Path) -> bool {
        if is_os_hidden_file(path) {
            return false;
        }
        if !self.own_files.is_empty() {
            let s = path_to_db_string(path);
            if self.own_files.iter().any(|own| s.starts_with(own.as_str())) {
                return false;
            }
        }
        matches_include(path, &self.file_includes) && !matches_any(path, &self.file_excludes)
    }

    /// Never index `db` or files sharing its name as a prefix (SQLite sidecars). `db` should be
    /// canonical so it compares equal to walked paths.
    pub fn ignore_database(&mut self, db: &Path) {
        self.own_files.push(path_to_db_string(db));
    }

    /// True if the directory at `path` should be watched and descended. The root is always
    /// accepted.
    pub fn accepts_dir(&self, path: &Path, root: &Path) -> bool {
        if path == root {
            return true;
        }
        matches_include(path, &self.directory_includes)
            && !matches_any(path, &self.directory_excludes)
    }
}

fn matches_include(path: &Path, includes: &[String]) -> bool {
    includes.is_empty() || matches_any(path, includes)
}

fn matches_any(path: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let path_str = path_to_db_string(path);
    patterns
        .iter()
        .any(|p| glob_match(p, name) || glob_match(p, &path_str))
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_chars(&pattern, &text)
}

fn glob_match_chars(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            if rest.is_empty() {
                return true; // trailing * matches everything
            }
            (0..=text.len()).any(|skip| glob_match_chars(rest, &text[skip..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob_match_chars(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && glob_match_chars(rest, &text[1..]),
    }
}

/// Path as stored in the document key: lossy UTF-8 with forward slashes.
pub fn path_to_db_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Canonicalize the watched root; a missing root is [`MetafilerError::UnreachablePath`].
pub fn check_root_and_canonicalize(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(MetafilerError::UnreachablePath(path.to_path_buf()).into());
    }
    let canonical = path.canonicalize().context("canonicalize path")?;
    if !canonical.is_dir() {
        anyhow::bail!("root is not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

/// True if the process is running with effective uid 0 (e.g. via sudo).
#[cfg(unix)]
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}
