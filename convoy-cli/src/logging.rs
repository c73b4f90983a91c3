use tracing_subscriber::EnvFilter;

/// Initializes `tracing` with a level raised by each repeated `-v`, honoring
/// `RUST_LOG` when set instead.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
