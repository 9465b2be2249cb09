use tracing_subscriber::EnvFilter;

/// Filter for a `-v` count: one enables info, two or more debug. Without
/// flags `RUST_LOG` applies, falling back to warnings only.
pub fn filter_for(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    }
}

pub fn init(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity))
        .with_target(verbosity > 1)
        .init();
}
