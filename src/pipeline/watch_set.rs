//! Set of directories with a live OS watch. Membership and subscription change together under
//! one lock, so `contains` never disagrees with what the backend is watching.

use log::{debug, info};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::MetafilerError;

/// Per-directory watch subscription. Implemented for notify's platform watcher; tests plug in
/// fakes.
pub trait WatchBackend: Send {
    fn watch_dir(&mut self, path: &Path) -> notify::Result<()>;
    fn unwatch_dir(&mut self, path: &Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch_dir(&mut self, path: &Path) -> notify::Result<()> {
        self.watch(path, RecursiveMode::NonRecursive)
    }

    fn unwatch_dir(&mut self, path: &Path) -> notify::Result<()> {
        self.unwatch(path)
    }
}

struct Inner {
    backend: Option<Box<dyn WatchBackend>>,
    watches: HashSet<PathBuf>,
}

pub struct WatchSet {
    root: PathBuf,
    recursive: bool,
    log_events: bool,
    inner: Mutex<Inner>,
}

impl WatchSet {
    pub fn new(
        root: PathBuf,
        recursive: bool,
        log_events: bool,
        backend: Box<dyn WatchBackend>,
    ) -> Self {
        info!("Filesystem watcher start: {}", root.display());
        Self {
            root,
            recursive,
            log_events,
            inner: Mutex::new(Inner {
                backend: Some(backend),
                watches: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subscribe `path`. No-op outside the root in non-recursive mode and for paths already
    /// watched. Membership is recorded only if the subscription succeeded.
    pub fn add(&self, path: &Path) -> Result<(), MetafilerError> {
        if !self.recursive && path != self.root {
            return Ok(());
        }
        let mut inner = self.lock();
        if inner.watches.contains(path) {
            return Ok(());
        }
        let Some(backend) = inner.backend.as_mut() else {
            return Err(MetafilerError::Watch {
                path: path.to_path_buf(),
                cause: "watcher is closed".into(),
            });
        };
        if self.log_events {
            info!("Add watcher: {}", path.display());
        }
        backend
            .watch_dir(path)
            .map_err(|e| MetafilerError::Watch {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
        inner.watches.insert(path.to_path_buf());
        Ok(())
    }

    /// Unsubscribe `path` and drop it from the set. Returns whether it was a member.
    ///
    /// The backend often reports "not found" here because the directory is already gone from
    /// disk (inotify drops the watch itself); that is logged at debug and ignored.
    pub fn remove(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        self.unwatch(&mut inner, path)
    }

    /// [`remove`](Self::remove) `dir` and every member below it, under one lock. Returns how
    /// many members were dropped.
    pub fn remove_tree(&self, dir: &Path) -> usize {
        let mut inner = self.lock();
        let mut doomed: Vec<PathBuf> = inner
            .watches
            .iter()
            .filter(|p| p.starts_with(dir) && p.as_path() != dir)
            .cloned()
            .collect();
        // Deepest first, then the directory itself.
        doomed.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        doomed.push(dir.to_path_buf());
        let mut removed = 0;
        for path in &doomed {
            if self.unwatch(&mut inner, path) {
                removed += 1;
            }
        }
        removed
    }

    fn unwatch(&self, inner: &mut Inner, path: &Path) -> bool {
        if self.log_events {
            info!("Remove watcher: {}", path.display());
        }
        let was_member = inner.watches.remove(path);
        if let Some(backend) = inner.backend.as_mut()
            && let Err(e) = backend.unwatch_dir(path)
        {
            debug!("Unwatch {}: {}", path.display(), e);
        }
        was_member
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().watches.contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the OS watcher (ending its event stream) and forget every membership.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.backend.take().is_some() {
            info!("Filesystem watcher stop");
        }
        inner.watches.clear();
    }
}
