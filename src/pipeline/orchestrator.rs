use anyhow::Context;
use crossbeam_channel::{Sender, bounded};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{PipelineState, RegisterMsg, Result};

use super::context::PipelineContext;
use super::dispatcher::Dispatcher;
use super::events::WatchStreams;
use super::walk::{WalkSummary, spawn_walk_thread};

/// Start the pipeline: watch the root, spawn the dispatcher, then spawn the initial-scan walk.
///
/// Failing to watch the root is fatal. The returned handles keep a sender on the registration
/// queue so the dispatcher outlives the walk; call [`PipelineHandles::wait`] (run-once) or
/// [`PipelineHandles::shutdown`] to finish.
pub fn run_pipeline(ctx: Arc<PipelineContext>, streams: WatchStreams) -> Result<PipelineHandles> {
    ctx.watch_set
        .add(&ctx.root)
        .context("watch root directory")?;

    let (register_tx, register_rx) = bounded::<RegisterMsg>(ctx.queue_capacity);

    let dispatcher = Dispatcher::new(Arc::clone(&ctx));
    let dispatch_handle = thread::Builder::new()
        .name(format!("{}-dispatch", env!("CARGO_PKG_NAME")))
        .spawn(move || dispatcher.run(register_rx, streams))
        .context("spawn dispatcher thread")?;

    ctx.set_state(PipelineState::Scanning);
    let include_files = !ctx.skip_initial_scan;
    let walk_handle = match spawn_walk_thread(Arc::clone(&ctx), register_tx.clone(), include_files)
    {
        Ok(h) => h,
        Err(e) => {
            ctx.shutdown.trigger();
            let _ = dispatch_handle.join();
            return Err(e).context("spawn walk thread");
        }
    };

    Ok(PipelineHandles {
        ctx,
        register_tx: Some(register_tx),
        walk_handle: Some(walk_handle),
        dispatch_handle: Some(dispatch_handle),
    })
}

/// Join handles and the shared context of a running pipeline.
pub struct PipelineHandles {
    ctx: Arc<PipelineContext>,
    register_tx: Option<Sender<RegisterMsg>>,
    walk_handle: Option<JoinHandle<WalkSummary>>,
    dispatch_handle: Option<JoinHandle<()>>,
}

impl PipelineHandles {
    pub fn state(&self) -> PipelineState {
        self.ctx.state()
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Queue a message as if it came from the walker. Fails once the pipeline is finishing.
    pub fn enqueue(&self, msg: RegisterMsg) -> Result<()> {
        let tx = self
            .register_tx
            .as_ref()
            .context("registration queue is closed")?;
        tx.send(msg)
            .map_err(|_| anyhow::anyhow!("registration queue is closed"))
    }

    /// Run-once completion: wait for the initial scan to finish and drain, then for every task.
    pub fn wait(mut self) -> Result<WalkSummary> {
        self.register_tx.take();
        self.join()
    }

    /// Signal shutdown, close the queue, join both threads and wait for in-flight tasks.
    pub fn shutdown(mut self) -> Result<WalkSummary> {
        self.ctx.shutdown.trigger();
        self.register_tx.take();
        self.join()
    }

    fn join(&mut self) -> Result<WalkSummary> {
        let summary = match self.walk_handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| anyhow::anyhow!("walk thread panicked"))?,
            None => WalkSummary::default(),
        };
        if let Some(h) = self.dispatch_handle.take() {
            h.join()
                .map_err(|_| anyhow::anyhow!("dispatcher thread panicked"))?;
        }
        self.ctx.workers.wait_idle();
        debug!(
            "Pipeline finished: {} files, {} dirs, {} skipped, aborted={}",
            summary.files, summary.dirs, summary.skipped, summary.aborted
        );
        Ok(summary)
    }
}

impl Drop for PipelineHandles {
    fn drop(&mut self) {
        if self.dispatch_handle.is_some() || self.walk_handle.is_some() {
            self.ctx.shutdown.trigger();
            self.register_tx.take();
            let _ = self.join();
        }
    }
}
