//! Thin helpers for invoking the external store toolchain and turning its
//! exit status and stdout into the structured errors the rest of the
//! workspace matches on.

use std::path::Path;
use std::process::Output;

use serde::de::DeserializeOwned;
use tokio::process::Command;

use crate::error::{Result, StoreError};

/// Runs `bin` with `args`, returning captured stdout on success and an
/// `ExternalToolFailure` on non-zero exit.
pub(crate) async fn run(op: &'static str, bin: &str, args: &[&str]) -> Result<Output> {
    tracing::debug!(op, bin, ?args, "invoking external tool");
    let output = Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(|source| StoreError::Spawn { op, source })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(StoreError::ExternalToolFailure {
            op,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `bin` with `args` in `cwd`, returning the exit status without
/// treating non-zero as an error (callers that need a distinct error
/// variant, e.g. `ActivationFailed`, inspect the status themselves).
pub(crate) async fn run_in(bin: &str, args: &[&str], cwd: &Path) -> std::io::Result<Output> {
    Command::new(bin).args(args).current_dir(cwd).output().await
}

/// Runs `bin` with `args` and parses its stdout as JSON of type `T`,
/// mapping a parse failure to `ExternalOutputMalformed`.
pub(crate) async fn run_json<T: DeserializeOwned>(
    op: &'static str,
    bin: &str,
    args: &[&str],
) -> Result<T> {
    let output = run(op, bin, args).await?;
    let raw = String::from_utf8_lossy(&output.stdout).into_owned();
    serde_json::from_str(&raw).map_err(|_| StoreError::ExternalOutputMalformed { op, raw })
}
