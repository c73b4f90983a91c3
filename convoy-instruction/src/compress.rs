//! Instruction directory <-> single transportable file: a thin wrapper over
//! a streaming tar archive, xz-compressed.

use std::fs::File;
use std::path::Path;

use tar::{Archive, Builder};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::{InstructionError, Result};

const COMPRESSION_LEVEL: u32 = 6;

/// Packs every entry under `source_dir` into a single xz-compressed tar file
/// at `dest_file`.
pub fn compress_dir_to_file(source_dir: &Path, dest_file: &Path) -> Result<()> {
    let run = || -> std::io::Result<()> {
        let file = File::create(dest_file)?;
        let mut builder = Builder::new(XzEncoder::new(file, COMPRESSION_LEVEL));
        builder.append_dir_all(".", source_dir)?;
        builder.into_inner()?.finish()?;
        Ok(())
    };
    run().map_err(|source| InstructionError::Compression {
        path: dest_file.to_path_buf(),
        source,
    })
}

/// Unpacks an xz-compressed tar file produced by [`compress_dir_to_file`]
/// into `dest_dir`, which must already exist.
pub fn decompress_file_to_dir(source_file: &Path, dest_dir: &Path) -> Result<()> {
    let run = || -> std::io::Result<()> {
        let file = File::open(source_file)?;
        Archive::new(XzDecoder::new(file)).unpack(dest_dir)
    };
    run().map_err(|source| InstructionError::Compression {
        path: source_file.to_path_buf(),
        source,
    })
}
