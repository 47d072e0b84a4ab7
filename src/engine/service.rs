//! Service lifecycle: bring every component up in dependency order, run the pipeline, and tear
//! down in reverse (pipeline, watcher, extractor, storage).

use anyhow::Context;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::extract::{FieldFilter, FileInfoExtractor, FilteredExtractor, MetadataExtractor};
use crate::engine::store::{DocumentStore, StoragePool};
use crate::engine::tools::check_root_and_canonicalize;
use crate::errors::MetafilerError;
use crate::pipeline::{
    PipelineContext, PipelineHandles, PipelineOpts, ShutdownSignal, WalkSummary, WatchSet,
    WatchStreams, create_fs_watcher, run_pipeline,
};
use crate::utils::config::Config;
use crate::{PipelineState, Result};

struct Started {
    handles: PipelineHandles,
    watch_set: Arc<WatchSet>,
    extractor: Arc<dyn MetadataExtractor>,
    shutdown: ShutdownSignal,
}

/// A running indexer. Finish it with [`Service::wait`] (run-once) or [`Service::stop`].
pub struct Service {
    root: PathBuf,
    handles: Option<PipelineHandles>,
    watch_set: Arc<WatchSet>,
    extractor: Arc<dyn MetadataExtractor>,
    store: Arc<StoragePool>,
    shutdown: ShutdownSignal,
}

impl Service {
    /// Validate `cfg`, check the root, open storage, create the watcher and start the pipeline.
    /// An unreachable root, a storage startup failure or a root watch failure is fatal.
    pub fn start(cfg: &Config) -> Result<Self> {
        cfg.validate()?;
        let root = check_root_and_canonicalize(&cfg.filesystem.path)?;
        let store = Arc::new(StoragePool::open(&cfg.storage)?);

        match Self::start_pipeline(cfg, &root, &store) {
            Ok(started) => Ok(Service {
                root,
                handles: Some(started.handles),
                watch_set: started.watch_set,
                extractor: started.extractor,
                store,
                shutdown: started.shutdown,
            }),
            Err(e) => {
                if let Err(close_err) = store.close() {
                    error!("{:#}", close_err);
                }
                Err(e)
            }
        }
    }

    fn start_pipeline(cfg: &Config, root: &Path, store: &Arc<StoragePool>) -> Result<Started> {
        let extractor: Arc<dyn MetadataExtractor> = Arc::new(FilteredExtractor::new(
            FileInfoExtractor::new(cfg.indexer.hash),
            FieldFilter::from(&cfg.indexer),
        ));

        let (senders, streams) = WatchStreams::channel();
        let watcher = create_fs_watcher(senders).map_err(|e| MetafilerError::Watch {
            path: root.to_path_buf(),
            cause: e.to_string(),
        })?;
        let watch_set = Arc::new(WatchSet::new(
            root.to_path_buf(),
            cfg.filesystem.recursive,
            cfg.filesystem.log_events,
            Box::new(watcher),
        ));

        let mut opts = PipelineOpts::from_config(cfg, root);
        if let Ok(db) = store.database().canonicalize() {
            opts.filter.ignore_database(&db);
        }

        let shutdown = ShutdownSignal::new();
        let ctx = PipelineContext::new(
            opts,
            Arc::clone(&watch_set),
            Arc::clone(store) as Arc<dyn DocumentStore>,
            Arc::clone(&extractor),
            shutdown.clone(),
        )?;
        let handles = match run_pipeline(Arc::new(ctx), streams) {
            Ok(h) => h,
            Err(e) => {
                watch_set.close();
                return Err(e);
            }
        };
        Ok(Started {
            handles,
            watch_set,
            extractor,
            shutdown,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<StoragePool> {
        &self.store
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.handles
            .as_ref()
            .map(PipelineHandles::state)
            .unwrap_or(PipelineState::Stopped)
    }

    /// Wait for the pipeline to finish on its own (run-once, or after the shutdown signal), then
    /// tear down.
    pub fn wait(mut self) -> Result<WalkSummary> {
        let summary = match self.handles.take() {
            Some(h) => h.wait(),
            None => Ok(WalkSummary::default()),
        };
        self.teardown();
        summary
    }

    /// Trigger shutdown, drain, then tear down.
    pub fn stop(mut self) -> Result<WalkSummary> {
        let summary = match self.handles.take() {
            Some(h) => h.shutdown(),
            None => Ok(WalkSummary::default()),
        };
        self.teardown();
        summary
    }

    fn teardown(&mut self) {
        self.watch_set.close();
        if let Err(e) = self.extractor.close() {
            error!("Extractor close failed: {:#}", e);
        }
        if let Err(e) = self.store.close() {
            error!("Storage close failed: {:#}", e);
        }
    }
}

/// Run until Ctrl+C, or until the initial scan is indexed when `cfg.pipeline.run_once` is set.
pub fn run_service(cfg: &Config) -> Result<()> {
    let service = Service::start(cfg)?;
    let signal = service.shutdown_signal();
    if let Err(e) = ctrlc::set_handler(move || signal.trigger()) {
        let _ = service.stop();
        return Err(e).context("set Ctrl+C handler");
    }

    let summary = if cfg.pipeline.run_once {
        service.wait()?
    } else {
        info!("Watching {} (Ctrl+C to stop)", service.root().display());
        service.shutdown_signal().wait();
        service.stop()?
    };
    info!(
        "Indexed tree: {} files, {} directories, {} skipped",
        summary.files, summary.dirs, summary.skipped
    );
    Ok(())
}
