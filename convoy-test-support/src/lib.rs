//! Test-only fixtures: an in-memory `StoreBackend` and the toplevel
//! fixtures it is built from.

mod error;
mod fake_backend;

pub use error::{FakeStoreError, Result};
pub use fake_backend::{FakeStoreBackend, ToplevelFixture};
