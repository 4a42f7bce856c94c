//! Tracing initialization
//!
//! One call at process startup; honors `RUST_LOG` and falls back to `info`.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Safe to call more than once; only
/// the first call wins (tests call it per-binary).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
