//! HTTP and WebSocket front end for the clinical inference pipeline.

pub mod config;
pub mod imaging;
pub mod models;
pub mod service;
pub mod ws;

pub use config::{ImageSettings, ServiceConfig};
pub use imaging::{ImagePreprocessor, PreprocessError, ResizingPreprocessor};
pub use service::{ApiError, AppState, build_router, create_app};

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global subscriber. `RUST_LOG` refines the filter and
/// `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
