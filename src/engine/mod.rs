//! Engine: storage, extraction, path tools and the service entry points.

pub mod arg_parser;
pub mod cli;
pub mod extract;
pub mod hashing;
pub mod service;
pub mod store;
pub mod tools;

pub use arg_parser::{Cli, Commands, QueryArgs, RunArgs};
pub use cli::{apply_run_args, handle_run};
pub use extract::{FieldFilter, FileInfoExtractor, FilteredExtractor, MetadataExtractor};
pub use service::{Service, run_service};
pub use store::{DocumentStore, StoragePool};
pub use tools::{PathFilter, check_root_and_canonicalize, glob_match, running_as_root};
