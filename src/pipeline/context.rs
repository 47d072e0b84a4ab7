//! Pipeline options and the shared context handed to the walk and dispatcher threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::Result;
use crate::engine::extract::MetadataExtractor;
use crate::engine::store::DocumentStore;
use crate::engine::tools::PathFilter;
use crate::utils::config::Config;
use crate::{LiveDispatch, PipelineState};

use super::shutdown::ShutdownSignal;
use super::watch_set::WatchSet;
use super::workers::WorkerPool;

/// Pipeline settings, taken from [`Config`] with the root already canonicalized.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    pub root: PathBuf,
    pub recursive: bool,
    pub filter: PathFilter,
    pub log_events: bool,
    pub skip_initial_scan: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    pub live_dispatch: LiveDispatch,
    pub run_once: bool,
}

impl PipelineOpts {
    pub fn from_config(cfg: &Config, root: &Path) -> Self {
        PipelineOpts {
            root: root.to_path_buf(),
            recursive: cfg.filesystem.recursive,
            filter: PathFilter::from(&cfg.filesystem),
            log_events: cfg.filesystem.log_events,
            skip_initial_scan: cfg.filesystem.skip_initial_scan,
            workers: cfg.pipeline.workers,
            queue_capacity: cfg.pipeline.queue_capacity,
            live_dispatch: cfg.pipeline.live_dispatch,
            run_once: cfg.pipeline.run_once,
        }
    }
}

/// Everything the walk thread, dispatcher and indexing tasks share.
pub struct PipelineContext {
    pub root: PathBuf,
    pub recursive: bool,
    pub filter: PathFilter,
    pub log_events: bool,
    pub skip_initial_scan: bool,
    pub queue_capacity: usize,
    pub live_dispatch: LiveDispatch,
    pub run_once: bool,
    pub watch_set: Arc<WatchSet>,
    pub store: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub workers: WorkerPool,
    pub shutdown: ShutdownSignal,
    state: AtomicU8,
}

impl PipelineContext {
    pub fn new(
        opts: PipelineOpts,
        watch_set: Arc<WatchSet>,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn MetadataExtractor>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        Ok(PipelineContext {
            root: opts.root,
            recursive: opts.recursive,
            filter: opts.filter,
            log_events: opts.log_events,
            skip_initial_scan: opts.skip_initial_scan,
            queue_capacity: opts.queue_capacity.max(1),
            live_dispatch: opts.live_dispatch,
            run_once: opts.run_once,
            watch_set,
            store,
            extractor,
            workers: WorkerPool::new(opts.workers)?,
            shutdown,
            state: AtomicU8::new(PipelineState::Initializing as u8),
        })
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
