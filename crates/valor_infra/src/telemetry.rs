use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `RUST_LOG` controls the
/// filter; defaults to `info`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
