//! The coordinating loop: consumes the registration queue, raw watch events, watch errors and the
//! shutdown signal, and turns each message into watch-set updates or indexing work.

use crossbeam_channel::{Receiver, never, select};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::engine::extract::MetadataExtractor;
use crate::engine::store::DocumentStore;
use crate::engine::tools::path_to_db_string;
use crate::{DocumentRecord, LiveDispatch, PipelineState, RegisterMsg};

use super::context::PipelineContext;
use super::events::WatchStreams;
use super::walk::{TreeWalker, classify_walk_error};

/// Work for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task {
    Index(PathBuf),
    Remove(PathBuf),
    /// Drop every document below a directory that left the tree.
    RemoveTree(PathBuf),
}

impl Task {
    pub fn path(&self) -> &Path {
        match self {
            Task::Index(p) | Task::Remove(p) | Task::RemoveTree(p) => p,
        }
    }

    /// Extract then upsert, or delete. Failures are logged and the item is dropped.
    pub fn run(self, store: &dyn DocumentStore, extractor: &dyn MetadataExtractor) {
        match self {
            Task::Index(path) => {
                let metadata = match extractor.extract(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("{:#}", e);
                        return;
                    }
                };
                let record = DocumentRecord {
                    path: path_to_db_string(&path),
                    metadata,
                };
                if let Err(e) = store.upsert(&record) {
                    error!("{:#}", e);
                }
            }
            Task::Remove(path) => match store.delete(&path_to_db_string(&path)) {
                Ok(true) => debug!("Removed {}", path.display()),
                Ok(false) => debug!("Nothing stored for {}", path.display()),
                Err(e) => error!("{:#}", e),
            },
            Task::RemoveTree(dir) => match store.delete_tree(&path_to_db_string(&dir)) {
                Ok(0) => {}
                Ok(n) => debug!("Removed {} documents under {}", n, dir.display()),
                Err(e) => error!("{:#}", e),
            },
        }
    }
}

/// Size and mtime of a file when it was last handed to a live index task.
#[derive(Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(meta: &fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// What the filesystem currently says about a message's path.
enum PathKind {
    Dir,
    File(FileStamp),
    Missing,
    /// Symlinks are neither followed nor indexed.
    Link,
}

pub struct Dispatcher {
    ctx: Arc<PipelineContext>,
    /// Backends report one write more than once (inotify: modify, then close-write). An
    /// unchanged file right after its own index task is not indexed again.
    last_indexed: RefCell<Option<(PathBuf, FileStamp)>>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            last_indexed: RefCell::new(None),
        }
    }

    /// Run the loop until shutdown, a closed registration queue, or (run-once) the end of the
    /// initial scan. Outstanding tasks are awaited before returning.
    pub fn run(self, register_rx: Receiver<RegisterMsg>, streams: WatchStreams) {
        let ctx = &self.ctx;
        let started = Instant::now();
        let shutdown_rx = ctx.shutdown.receiver().clone();
        let mut events_rx = streams.events;
        let mut errors_rx = streams.errors;
        info!("Registration start");

        loop {
            let mut stop = false;
            let mut events_closed = false;
            let mut errors_closed = false;
            select! {
                recv(register_rx) -> msg => match msg {
                    Ok(msg) if msg.is_scan_sentinel() => {
                        info!("Initial scan stop: {:?}", started.elapsed());
                        if ctx.run_once {
                            stop = true;
                        } else {
                            ctx.set_state(PipelineState::Live);
                        }
                    }
                    Ok(msg) => self.handle(msg),
                    Err(_) => stop = true,
                },
                recv(events_rx) -> event => match event {
                    Ok(event) => {
                        for msg in RegisterMsg::from_event(&event) {
                            self.handle(msg);
                        }
                    }
                    Err(_) => events_closed = true,
                },
                recv(errors_rx) -> err => match err {
                    Ok(e) => warn!("Watch error: {}", e),
                    Err(_) => errors_closed = true,
                },
                recv(shutdown_rx) -> _ => stop = true,
            }
            if stop || ctx.shutdown.is_set() {
                break;
            }
            if events_closed {
                debug!("Watch event stream closed");
                events_rx = never();
            }
            if errors_closed {
                errors_rx = never();
            }
        }

        ctx.set_state(PipelineState::Draining);
        ctx.workers.wait_idle();
        ctx.set_state(PipelineState::Stopped);
        info!("Registration stop");
    }

    /// Process one message: directories update the watch set, files become tasks.
    pub fn handle(&self, msg: RegisterMsg) {
        let ctx = &self.ctx;
        if ctx.log_events {
            info!("{}", msg);
        }

        let kind = if ctx.watch_set.contains(&msg.path) {
            PathKind::Dir
        } else {
            match fs::symlink_metadata(&msg.path) {
                Ok(m) if m.file_type().is_symlink() => PathKind::Link,
                Ok(m) if m.is_dir() => PathKind::Dir,
                Ok(m) => PathKind::File(FileStamp::of(&m)),
                Err(_) => PathKind::Missing,
            }
        };

        match kind {
            PathKind::Link => {}
            PathKind::Dir => self.handle_dir(&msg),
            PathKind::File(_) | PathKind::Missing => {
                if !ctx.filter.accepts_file(&msg.path) {
                    return;
                }
                let stamp = match kind {
                    PathKind::File(stamp) => Some(stamp),
                    _ => None,
                };
                let task = if msg.is_initial_scan
                    || (stamp.is_some() && (msg.is_written || msg.is_renamed))
                {
                    Task::Index(msg.path)
                } else if msg.is_deleted || (stamp.is_none() && msg.is_renamed) {
                    Task::Remove(msg.path)
                } else {
                    return;
                };
                if !msg.is_initial_scan && self.is_repeat(&task, stamp) {
                    debug!("Unchanged since last index: {}", task.path().display());
                    return;
                }
                self.dispatch(task, msg.is_initial_scan);
            }
        }
    }

    /// Record live index work, and report whether it repeats the previous task on an unchanged
    /// file. Anything else resets the record.
    fn is_repeat(&self, task: &Task, stamp: Option<FileStamp>) -> bool {
        let mut last = self.last_indexed.borrow_mut();
        match (task, stamp) {
            (Task::Index(path), Some(stamp)) => {
                let repeat = matches!(&*last, Some((p, s)) if p == path && *s == stamp);
                *last = Some((path.clone(), stamp));
                repeat
            }
            _ => {
                *last = None;
                false
            }
        }
    }

    fn handle_dir(&self, msg: &RegisterMsg) {
        let ctx = &self.ctx;
        let gone = !msg.path.exists();
        if msg.is_deleted || gone {
            // Deleted or moved away: nothing below it is in the tree any more.
            let dropped = ctx.watch_set.remove_tree(&msg.path);
            debug!("Dropped {} watches under {}", dropped, msg.path.display());
            self.dispatch(Task::RemoveTree(msg.path.clone()), false);
            return;
        }
        let appeared = msg.is_created || msg.is_renamed;
        if !(msg.is_initial_scan || appeared) || !ctx.filter.accepts_dir(&msg.path, &ctx.root) {
            return;
        }
        let newly_watched = !ctx.watch_set.contains(&msg.path);
        if let Err(e) = ctx.watch_set.add(&msg.path) {
            warn!("{}", e);
            return;
        }
        // Already watched means the walker (or an earlier event) got here first.
        if newly_watched && appeared && !msg.is_initial_scan && ctx.recursive {
            self.catch_up(&msg.path);
        }
    }

    /// A directory that shows up live (mkdir, move-in) may already hold entries whose events we
    /// never saw. Watch its subdirectories and index its files.
    fn catch_up(&self, dir: &Path) {
        let ctx = &self.ctx;
        let walker = TreeWalker::new(dir, ctx.recursive, ctx.filter.clone());
        let shutdown = ctx.shutdown.clone();
        let walk = walker.walk(Some(ctx.shutdown.clone()), |err| {
            classify_walk_error(&shutdown, err)
        });
        for item in walk {
            if item.path == dir {
                continue;
            }
            if item.is_dir {
                if let Err(e) = ctx.watch_set.add(&item.path) {
                    warn!("{}", e);
                }
            } else {
                self.dispatch(Task::Index(item.path), false);
            }
        }
    }

    fn dispatch(&self, task: Task, initial_scan: bool) {
        let ctx = &self.ctx;
        if initial_scan || ctx.live_dispatch == LiveDispatch::Pool {
            let store = Arc::clone(&ctx.store);
            let extractor = Arc::clone(&ctx.extractor);
            ctx.workers
                .submit(move || task.run(store.as_ref(), extractor.as_ref()));
        } else {
            // Inline work runs on this thread; a panic must not take the event loop with it.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                task.run(ctx.store.as_ref(), ctx.extractor.as_ref())
            }));
            if outcome.is_err() {
                error!("Indexing task panicked");
            }
        }
    }
}
