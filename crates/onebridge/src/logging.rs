//! Log output setup for binaries built on Onebridge.
//!
//! The library only emits `tracing` events; nothing is printed until a
//! subscriber is installed. [`init`] installs a compact `fmt` subscriber
//! filtered by `RUST_LOG`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber with `info` as the default level.
///
/// `RUST_LOG=onebridge=debug` shows every action call and reply. Calling
/// this twice is harmless: the second call does nothing.
pub fn init() {
    init_with_default(LevelFilter::INFO);
}

/// Like [`init`], with a different level for targets `RUST_LOG` does not
/// mention.
pub fn init_with_default(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .try_init();
}
