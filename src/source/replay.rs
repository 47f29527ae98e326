//! Offline fetch source replaying canned responses

use super::FetchSource;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Fetch source that never touches the network
///
/// URLs are routed to files under `response_dir`:
///
/// | URL shape                       | File                  |
/// |---------------------------------|-----------------------|
/// | ends with `/classify`           | `classify.json`       |
/// | contains `/classify/` + `month=`| `classify_month.json` |
/// | contains `/article/`            | `article.json`        |
/// | contains `/section/`            | `section.json`        |
///
/// Anything else, or a missing file, yields an empty object. Downloads write
/// an empty file and report success.
pub struct ReplaySource {
    response_dir: PathBuf,
}

impl ReplaySource {
    /// Serve responses from `response_dir`
    pub fn new(response_dir: PathBuf) -> Self {
        Self { response_dir }
    }

    fn route(url: &str) -> Option<&'static str> {
        if url.ends_with("/classify") {
            Some("classify.json")
        } else if url.contains("/classify/") && url.contains("month=") {
            Some("classify_month.json")
        } else if url.contains("/article/") {
            Some("article.json")
        } else if url.contains("/section/") {
            Some("section.json")
        } else {
            None
        }
    }

    async fn load(&self, url: &str, name: &str) -> serde_json::Value {
        let path = self.response_dir.join(name);
        let parsed: std::result::Result<serde_json::Value, String> = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        parsed.unwrap_or_else(|e| {
            error!(url, file = %path.display(), error = %e, "Replay response unavailable");
            empty()
        })
    }
}

async fn write_placeholder(dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, b"").await
}

fn empty() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[async_trait]
impl FetchSource for ReplaySource {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        match Self::route(url) {
            Some(name) => Ok(self.load(url, name).await),
            None => {
                warn!(url, "Replay source has no response for URL");
                Ok(empty())
            }
        }
    }

    async fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "ok": true }))
    }

    async fn download_file(&self, url: &str, dest: &Path) -> bool {
        match write_placeholder(dest).await {
            Ok(()) => true,
            Err(e) => {
                error!(url, dest = %dest.display(), error = %e, "Replay download failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
