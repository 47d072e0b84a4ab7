//! Pipeline components: watch set, initial-scan walk, dispatcher loop, worker pool.

pub mod context;
pub mod dispatcher;
pub mod events;
pub mod orchestrator;
pub mod shutdown;
pub mod walk;
pub mod watch_set;
pub mod workers;

pub use context::{PipelineContext, PipelineOpts};
pub use dispatcher::{Dispatcher, Task};
pub use events::{WatchSenders, WatchStreams, create_fs_watcher};
pub use orchestrator::{PipelineHandles, run_pipeline};
pub use shutdown::ShutdownSignal;
pub use walk::{
    TreeWalker, Walk, WalkErrorAction, WalkItem, WalkSummary, run_walk_loop, spawn_walk_thread,
};
pub use watch_set::{WatchBackend, WatchSet};
pub use workers::WorkerPool;
