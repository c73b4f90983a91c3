//! The target-local client metadata cache: locally-known `.narinfo` files,
//! an advisory lock over the cache directory, and generation history.

mod client_state;
mod error;
mod generations;
mod lock;

pub use client_state::ClientStateStore;
pub use error::{CacheError, Result};
pub use generations::{GenerationHistory, GenerationRecord};
pub use lock::CacheLock;
