//! Read-only history backing `list-generations`.
//!
//! `Switch.execute` appends one record each time it activates a generation;
//! nothing here changes activation semantics.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use convoy_core::{ActivationMode, StoreRoot};

use crate::error::{CacheError, IoContext, Result};

const GENERATIONS_FILE_NAME: &str = "generations.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub item: StoreRoot,
    pub mode: ActivationMode,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: time::OffsetDateTime,
}

/// The append-only generation history for one target.
pub struct GenerationHistory {
    path: PathBuf,
}

impl GenerationHistory {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: cache_dir.into().join(GENERATIONS_FILE_NAME),
        }
    }

    fn read(&self) -> Result<Vec<GenerationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).io_context(&self.path)?;
        serde_json::from_str(&contents).map_err(|source| CacheError::CorruptHistory {
            path: self.path.clone(),
            source,
        })
    }

    /// Appends one record for a just-activated generation.
    pub fn append(&self, item: StoreRoot, mode: ActivationMode, applied_at: time::OffsetDateTime) -> Result<()> {
        let mut records = self.read()?;
        records.push(GenerationRecord {
            item,
            mode,
            applied_at,
        });
        let serialized =
            serde_json::to_string_pretty(&records).expect("generation records always serialize");
        fs::write(&self.path, serialized).io_context(&self.path)
    }

    /// Returns every recorded generation, oldest first.
    pub fn list(&self) -> Result<Vec<GenerationRecord>> {
        self.read()
    }
}
