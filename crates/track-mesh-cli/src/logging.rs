//! Logging setup
//!
//! With the `profiling` feature the library's profiling scopes are emitted as
//! tracing spans, so the same fmt layer shows them.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the fmt subscriber, defaulting `RUST_LOG` when unset
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "debug,track_mesh_lib=info");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    #[cfg(feature = "profiling")]
    tracing::info!("Logging initialized, profiling scopes emitted as spans");
    #[cfg(not(feature = "profiling"))]
    tracing::info!("Logging initialized (profiling disabled in this build)");
}
