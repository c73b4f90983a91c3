//! Store I/O adapter: the only crate in this workspace that shells out to
//! the external store toolchain.

mod backend;
mod error;
mod process;

pub use backend::ProcessStoreBackend;
pub use error::{Result, StoreError};
