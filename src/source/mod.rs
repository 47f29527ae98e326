//! Fetch sources for the catalog API
//!
//! Every pipeline stage talks to the catalog through [`FetchSource`]. Two
//! implementations exist:
//! - [`LiveSource`] - networked, with a concurrency gate and per-request timeout
//! - [`ReplaySource`] - offline stub serving canned responses from a directory
//!
//! A source is opened per pipeline run and dropped when the run ends, so its
//! connection pool and concurrency gate never outlive one cycle.

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

mod live;
mod replay;

pub use live::LiveSource;
pub use replay::ReplaySource;

/// Interface to the remote catalog
#[async_trait]
pub trait FetchSource: Send + Sync {
    /// GET a JSON document
    ///
    /// An empty body yields `Value::Null`; callers decide what "empty" means
    /// with [`is_empty_document`].
    async fn get_json(&self, url: &str) -> Result<serde_json::Value>;

    /// POST a JSON body and return the JSON answer
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value>;

    /// Download `url` into `dest`
    ///
    /// Returns `false` on any failure and never leaves a partial file behind.
    async fn download_file(&self, url: &str, dest: &Path) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Which [`FetchSource`] implementation a run uses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Talk to the remote catalog
    #[default]
    Live,
    /// Replay canned responses from `offline.response_dir`
    Offline,
}

impl FetchMode {
    /// Map the `offline` flag used by the control surface
    pub fn from_offline(offline: bool) -> Self {
        if offline {
            FetchMode::Offline
        } else {
            FetchMode::Live
        }
    }
}

/// Open a fresh source for one pipeline run
pub fn open_source(config: &Config, mode: FetchMode) -> Result<Arc<dyn FetchSource>> {
    let source: Arc<dyn FetchSource> = match mode {
        FetchMode::Live => Arc::new(LiveSource::new(&config.remote)?),
        FetchMode::Offline => Arc::new(ReplaySource::new(config.offline.response_dir.clone())),
    };
    tracing::debug!(source = source.name(), "Opened fetch source");
    Ok(source)
}

/// Whether a fetched document counts as an empty response
pub fn is_empty_document(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}
