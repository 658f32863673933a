pub mod admission;
pub mod clinical;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod db;
pub mod discharge;
pub mod error;
pub mod identity;
pub mod merge;
pub mod models;

pub use crate::engine::CarelinkCore;
pub use crate::error::{CoreError, ErrorBody, ErrorKind};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} engine v{}", config::APP_NAME, config::APP_VERSION);
    }
}
