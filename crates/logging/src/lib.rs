//! One-line `tracing` bootstrap shared by both binaries.
//!
//! `-v`/`--verbose` raises the default filter from `info` to `debug`; the
//! `FILEBOX_LOG` environment variable, if set, always wins (matching the
//! usual `tracing-subscriber` `EnvFilter` convention).

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber. Call once, at process startup.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("FILEBOX_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
