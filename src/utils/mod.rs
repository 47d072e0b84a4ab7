pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod metafiler_toml;

pub use config::*;
pub use fd_limit::{
    FDS_PER_CONNECTION, FDS_PER_WORKER, max_open_fds, max_workers_by_fd_limit, workers_within,
};
pub use logger::setup_logging;
pub use metafiler_toml::{apply_env_overrides, load_config, parse_config, write_default_config};
