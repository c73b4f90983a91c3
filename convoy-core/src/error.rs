use crate::types::StorePath;

/// Failures raised by the pure delta and archive algorithms.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("closure contains a cycle at {path}")]
    ClosureCycle { path: StorePath },

    #[error("archive is missing the requested {kind} entry for {path}")]
    ArchiveIncomplete { kind: ArchiveEntryKind, path: StorePath },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEntryKind {
    Info,
    Data,
}

impl std::fmt::Display for ArchiveEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveEntryKind::Info => f.write_str("info"),
            ArchiveEntryKind::Data => f.write_str("data"),
        }
    }
}
