//! Public and internal types for the metafiler API and pipeline.

use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Flat field name → value map produced by a metadata extractor.
pub type Metadata = BTreeMap<String, String>;

/// One stored document: the indexed path (unique key) and its extracted metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    pub metadata: Metadata,
}

/// Unit of work consumed by the dispatcher.
///
/// Created by the tree walker (initial scan) or translated from a raw watch event (live phase).
/// Outside the initial scan one phase flag is set; an empty path with `is_initial_scan` is the
/// end-of-scan sentinel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterMsg {
    pub path: PathBuf,
    pub is_initial_scan: bool,
    pub is_created: bool,
    pub is_written: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub is_chmoded: bool,
}

impl RegisterMsg {
    /// Message for a path found by the initial scan.
    pub fn initial_scan(path: PathBuf) -> Self {
        Self {
            path,
            is_initial_scan: true,
            ..Self::default()
        }
    }

    /// "Initial scan exhausted" marker.
    pub fn scan_sentinel() -> Self {
        Self::initial_scan(PathBuf::new())
    }

    pub fn is_scan_sentinel(&self) -> bool {
        self.is_initial_scan && self.path.as_os_str().is_empty()
    }

    /// Translate a raw notify event into work items, one per affected path.
    ///
    /// `Access` (other than close-after-write) and `Other` kinds carry no content change and
    /// yield nothing. A `Name(Both)` rename reports `[from, to]` and becomes a delete-like
    /// message for the old name and a create-like message for the new one.
    pub fn from_event(event: &notify::Event) -> Vec<RegisterMsg> {
        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push(Self::renamed_from(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(Self::renamed_to(to.clone()));
            }
            return out;
        }

        let Some(template) = Self::flags_for(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .iter()
            .map(|p| RegisterMsg {
                path: p.clone(),
                ..template.clone()
            })
            .collect()
    }

    fn flags_for(kind: &EventKind) -> Option<RegisterMsg> {
        let msg = match kind {
            EventKind::Create(_) => RegisterMsg {
                is_created: true,
                ..Self::default()
            },
            EventKind::Remove(_) => RegisterMsg {
                is_deleted: true,
                ..Self::default()
            },
            EventKind::Modify(ModifyKind::Metadata(_)) => RegisterMsg {
                is_chmoded: true,
                ..Self::default()
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                Self::renamed_from(PathBuf::new())
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::renamed_to(PathBuf::new()),
            // Unpaired renames (inotify without a cookie match, some backends) say nothing
            // about which side we are on; treat as plain rename and let the stat decide.
            EventKind::Modify(ModifyKind::Name(_)) => RegisterMsg {
                is_renamed: true,
                ..Self::default()
            },
            // Close-after-write is the only content signal for files created empty (`touch`).
            EventKind::Modify(_)
            | EventKind::Any
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => RegisterMsg {
                is_written: true,
                ..Self::default()
            },
            EventKind::Access(_) | EventKind::Other => return None,
        };
        Some(msg)
    }

    fn renamed_from(path: PathBuf) -> Self {
        RegisterMsg {
            path,
            is_renamed: true,
            is_deleted: true,
            ..Self::default()
        }
    }

    fn renamed_to(path: PathBuf) -> Self {
        RegisterMsg {
            path,
            is_renamed: true,
            is_created: true,
            is_written: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for RegisterMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        let tags = [
            (self.is_initial_scan, "INITIALSCAN"),
            (self.is_created, "CREATED"),
            (self.is_written, "WRITTEN"),
            (self.is_deleted, "DELETED"),
            (self.is_renamed, "RENAMED"),
            (self.is_chmoded, "CHMODED"),
        ];
        for (set, tag) in tags {
            if set {
                write!(f, " {tag}")?;
            }
        }
        Ok(())
    }
}

/// Lifecycle of the pipeline dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Initializing = 0,
    Scanning = 1,
    Live = 2,
    Draining = 3,
    Stopped = 4,
}

impl PipelineState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Initializing,
            1 => PipelineState::Scanning,
            2 => PipelineState::Live,
            3 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }
}

/// Where live-phase work runs: on the dispatcher thread (lower latency) or on the worker pool
/// (isolates a slow extractor from the event loop).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveDispatch {
    #[default]
    Inline,
    Pool,
}
