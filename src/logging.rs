//! Process-wide `tracing` subscriber.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install a stderr fmt subscriber. `RUST_LOG` overrides `level`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(level: &str) {
    let default = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
