use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures raised by the store I/O adapter. Every external-tool failure
/// carries the operation name and captured stderr so the CLI can surface a
/// useful message without the caller having to re-derive context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("`{op}` exited with {status}: {stderr}")]
    ExternalToolFailure {
        op: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("`{op}` produced output that does not match the expected shape: {raw}")]
    ExternalOutputMalformed { op: &'static str, raw: String },

    #[error("hostname {requested:?} is not declared in the flake; available: {available:?}")]
    UnknownHostname {
        requested: String,
        available: Vec<String>,
    },

    #[error("import of {path} failed: {reason}")]
    ImportFailed { path: String, reason: String },

    #[error("activation of {path} failed: {reason}")]
    ActivationFailed { path: String, reason: String },

    #[error("failed to spawn `{op}`: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}
