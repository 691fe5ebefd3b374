use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes the fmt subscriber.
///
/// An explicit level from the CLI wins, otherwise `RUST_LOG` applies, with
/// everything except this crate quieted down by default.
pub fn init_tracer(level: Option<Level>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("warn,tv_renamer={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,tv_renamer=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
