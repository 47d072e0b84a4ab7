//! Initial-scan tree walker and the walk thread that feeds the registration queue.

use crossbeam_channel::Sender;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use walkdir::{DirEntry, WalkDir};

use crate::RegisterMsg;
use crate::engine::tools::PathFilter;

use super::context::PipelineContext;
use super::shutdown::ShutdownSignal;

/// One path yielded by the walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkItem {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// What to do with a per-entry walk error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkErrorAction {
    /// Drop the node (and its subtree) and keep walking.
    Skip,
    /// Stop the whole walk.
    Abort,
}

/// Counters reported when a walk finishes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
    /// Ended early by shutdown. Not an error.
    pub aborted: bool,
}

/// Filtered walk over one root. Symlinks are never followed or yielded. In non-recursive mode
/// subdirectories are pruned where they are found.
#[derive(Clone, Debug)]
pub struct TreeWalker {
    root: PathBuf,
    recursive: bool,
    filter: PathFilter,
}

impl TreeWalker {
    pub fn new(root: &Path, recursive: bool, filter: PathFilter) -> Self {
        Self {
            root: root.to_path_buf(),
            recursive,
            filter,
        }
    }

    /// Start a lazy walk. `on_error` classifies entry errors; `shutdown`, when set, ends the walk
    /// at the next entry.
    pub fn walk<C>(&self, shutdown: Option<ShutdownSignal>, on_error: C) -> Walk<C>
    where
        C: FnMut(&walkdir::Error) -> WalkErrorAction,
    {
        let root = self.root.clone();
        let recursive = self.recursive;
        let filter = self.filter.clone();
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |e| keep_entry(e, &root, recursive, &filter));
        Walk {
            inner: Box::new(inner),
            on_error,
            shutdown,
            summary: WalkSummary::default(),
            done: false,
        }
    }
}

fn keep_entry(entry: &DirEntry, root: &Path, recursive: bool, filter: &PathFilter) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let ft = entry.file_type();
    if ft.is_symlink() {
        return false;
    }
    if ft.is_dir() {
        return recursive && filter.accepts_dir(entry.path(), root);
    }
    filter.accepts_file(entry.path())
}

/// Iterator returned by [`TreeWalker::walk`]. Read [`Walk::summary`] after it is exhausted.
pub struct Walk<C> {
    inner: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>,
    on_error: C,
    shutdown: Option<ShutdownSignal>,
    summary: WalkSummary,
    done: bool,
}

impl<C> Walk<C> {
    pub fn summary(&self) -> &WalkSummary {
        &self.summary
    }
}

impl<C> Iterator for Walk<C>
where
    C: FnMut(&walkdir::Error) -> WalkErrorAction,
{
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        while !self.done {
            if self.shutdown.as_ref().is_some_and(|s| s.is_set()) {
                self.summary.aborted = true;
                self.done = true;
                break;
            }
            match self.inner.next() {
                None => self.done = true,
                Some(Ok(entry)) => {
                    let is_dir = entry.file_type().is_dir();
                    if is_dir {
                        self.summary.dirs += 1;
                    } else {
                        self.summary.files += 1;
                    }
                    return Some(WalkItem {
                        path: entry.into_path(),
                        is_dir,
                    });
                }
                Some(Err(err)) => match (self.on_error)(&err) {
                    WalkErrorAction::Skip => self.summary.skipped += 1,
                    WalkErrorAction::Abort => {
                        self.summary.aborted = true;
                        self.done = true;
                    }
                },
            }
        }
        None
    }
}

/// Error classifier for the initial scan: abort only once shutdown was requested.
pub fn classify_walk_error(shutdown: &ShutdownSignal, err: &walkdir::Error) -> WalkErrorAction {
    if shutdown.is_set() {
        return WalkErrorAction::Abort;
    }
    match err.path() {
        Some(p) => warn!("Cannot index path or file: {} caused by: {}", p.display(), err),
        None => warn!("Walk error: {}", err),
    }
    WalkErrorAction::Skip
}

/// Spawn the initial-scan thread. Directories are watched as they are visited, before their
/// message is queued; with `include_files` false only directories are visited (watch setup
/// without a catch-up scan). The end-of-scan sentinel is queued unless the walk was aborted.
pub fn spawn_walk_thread(
    ctx: Arc<PipelineContext>,
    register_tx: Sender<RegisterMsg>,
    include_files: bool,
) -> std::io::Result<JoinHandle<WalkSummary>> {
    thread::Builder::new()
        .name(format!("{}-walk", env!("CARGO_PKG_NAME")))
        .spawn(move || run_walk_loop(&ctx, register_tx, include_files))
}

/// Walk `ctx.root` and send one [`RegisterMsg`] per kept path. Blocks when the queue is full.
pub fn run_walk_loop(
    ctx: &PipelineContext,
    register_tx: Sender<RegisterMsg>,
    include_files: bool,
) -> WalkSummary {
    if include_files {
        info!("Initial scan start");
    } else {
        info!("Initial scan skipped; registering directory watches only");
    }

    let walker = TreeWalker::new(&ctx.root, ctx.recursive, ctx.filter.clone());
    let shutdown = ctx.shutdown.clone();
    let mut walk = walker.walk(Some(ctx.shutdown.clone()), |err| {
        classify_walk_error(&shutdown, err)
    });

    let mut disconnected = false;
    for item in walk.by_ref() {
        if item.is_dir {
            if let Err(e) = ctx.watch_set.add(&item.path) {
                warn!("{}", e);
            }
        } else if !include_files {
            continue;
        }
        if register_tx.send(RegisterMsg::initial_scan(item.path)).is_err() {
            disconnected = true;
            break;
        }
    }

    let mut summary = walk.summary().clone();
    if disconnected {
        summary.aborted = true;
    }
    if !summary.aborted {
        let _ = register_tx.send(RegisterMsg::scan_sentinel());
    }
    summary
}
