//! Logging setup for the binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the program. Console output shows up under the `console` target.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` with `verbose`, `info` without.
/// Calling this twice is harmless.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .try_init();
}
