//! # catalog-mirror
//!
//! Incremental mirror of a remote two-level content catalog into a local
//! file store.
//!
//! ## Design Philosophy
//!
//! catalog-mirror is designed to be:
//! - **Incremental** - Only missing or changed content is fetched
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - The REST layer and demo server sit on top of [`CatalogMirror`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use catalog_mirror::{CatalogMirror, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.storage.data_dir = "mirror-data".into();
//!
//!     let mirror = CatalogMirror::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = mirror.run_full(false).await;
//!     println!("success: {}", report.success);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// The service object tying store, pipeline and monitor together
pub mod mirror;
/// Interval-driven poll loop
pub mod monitor;
/// Change detection, index expansion, content and image materialization
pub mod pipeline;
/// Live and offline fetch sources
pub mod source;
/// On-disk layout and persistence helpers
pub mod store;
/// Core types and events
pub mod types;
/// Local store verification
pub mod verify;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, ErrorKind, Result, ToHttpStatus};
pub use mirror::CatalogMirror;
pub use monitor::{MonitorService, MonitorSettings};
pub use source::{FetchMode, FetchSource};
pub use store::LocalStore;
pub use types::{
    ChangeReport, ContentItem, ContentKind, Event, ItemOutcome, MaterializeReport, MonitorStatus,
    RunReport, Stage,
};
pub use verify::VerifyReport;

/// Helper function to run the mirror with graceful signal handling.
///
/// Waits for a termination signal and then calls the mirror's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use catalog_mirror::{CatalogMirror, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mirror = CatalogMirror::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(mirror).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(mirror: CatalogMirror) -> Result<()> {
    wait_for_signal().await;
    mirror.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
