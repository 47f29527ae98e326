//! Application state for the API server

use crate::{CatalogMirror, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The mirror service
    pub mirror: Arc<CatalogMirror>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(mirror: Arc<CatalogMirror>, config: Arc<Config>) -> Self {
        Self { mirror, config }
    }
}
