//! Pure data model and algorithms for the store-update instruction
//! lifecycle: store paths and roots, path metadata, the delta engine, and
//! the `StoreBackend` capability interface.
//!
//! Nothing in this crate performs IO; it operates purely on values already
//! retrieved by an implementation of `StoreBackend`.

pub mod backend;
pub mod delta;
pub mod error;
pub mod types;

pub use backend::{ActivationMode, BuildOutput, StoreBackend};
pub use delta::{compute_delta, require_all_present, Delta};
pub use error::{ArchiveEntryKind, CoreError};
pub use types::{GitRevision, InvalidRevision, PathInfo, StoreRoot, StorePath};
