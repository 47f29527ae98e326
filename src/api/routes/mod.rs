//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`mirror`] - Change check, full run, single item, verification
//! - [`monitor`] - Poll loop control
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod mirror;
mod monitor;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use mirror::*;
pub use monitor::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /watch and POST /crawl/run
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct OfflineQuery {
    /// Use the offline replay source (default: false)
    #[serde(default)]
    pub offline: bool,
}

/// Query parameters for POST /crawl/item/:kind/:id
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CrawlItemQuery {
    /// Delete the local copy before fetching (default: false)
    #[serde(default)]
    pub force: bool,
    /// Use the offline replay source (default: false)
    #[serde(default)]
    pub offline: bool,
}

/// Query parameters for GET /verify
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct VerifyQuery {
    /// Include the per-item issue list (default: false)
    #[serde(default)]
    pub detail: bool,
}

/// Request body for POST /monitor/start
///
/// Omitted fields fall back to the configured interval, live mode and
/// crawl-on-update.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartMonitorRequest {
    /// Seconds between cycles
    pub interval_seconds: Option<u64>,
    /// Use the offline replay source
    #[serde(default)]
    pub offline: bool,
    /// Expand and materialize when the index changed
    #[serde(default = "default_true")]
    pub crawl_on_update: bool,
}

/// Request body for POST /monitor/interval
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct IntervalRequest {
    /// Seconds between cycles (values below 1 are raised to 1)
    pub interval_seconds: u64,
}

fn default_true() -> bool {
    true
}
