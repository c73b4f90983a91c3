use thiserror::Error;

pub type Result<T> = std::result::Result<T, FakeStoreError>;

/// Failures raised by [`crate::FakeStoreBackend`]. Mirrors the shape of
/// `convoy_store::StoreError` closely enough that code generic over
/// `StoreBackend::Error` exercises the same error-wrapping paths in tests
/// as it would against the real adapter.
#[derive(Error, Debug)]
pub enum FakeStoreError {
    #[error("hostname {requested:?} is not declared; available: {available:?}")]
    UnknownHostname {
        requested: String,
        available: Vec<String>,
    },

    #[error("no fixture registered for hostname {hostname:?} at revision {revision}")]
    NoFixture { hostname: String, revision: String },

    #[error("archive entry {name:?} does not correspond to any known store path")]
    UnknownArchiveEntry { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
