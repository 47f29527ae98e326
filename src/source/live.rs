//! Networked fetch source

use super::FetchSource;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Fetch source backed by `reqwest`
///
/// All network operations (JSON requests and file downloads) share one
/// semaphore, so at most `max_concurrent_requests` are in flight. Each
/// operation is bounded by `request_timeout`.
pub struct LiveSource {
    client: reqwest::Client,
    limiter: Arc<Semaphore>,
    image_headers: HeaderMap,
    image_header_hosts: Vec<String>,
    timeout: Duration,
}

impl LiveSource {
    /// Build a client from the remote configuration
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_concurrent_requests)
            .default_headers(header_map(&config.headers, "remote.headers")?)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            image_headers: header_map(&config.image_headers, "remote.image_headers")?,
            image_header_hosts: config.image_header_hosts.clone(),
            timeout: config.request_timeout,
        })
    }

    fn headers_for(&self, url: &str) -> Option<&HeaderMap> {
        self.image_header_hosts
            .iter()
            .any(|host| url.contains(host.as_str()))
            .then_some(&self.image_headers)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<serde_json::Value> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        debug!(url, "Sending request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::fetch(url, format!("timed out after {}s", self.timeout.as_secs()))
            } else {
                Error::fetch(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| Error::fetch(url, e))?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "Request succeeded");

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&body)
            .map_err(|e| Error::Parse(format!("response from {} is not JSON: {}", url, e)))
    }

    async fn stream_to_file(&self, url: &str, part: &Path) -> Result<()> {
        let mut request = self.client.get(url);
        if let Some(headers) = self.headers_for(url) {
            request = request.headers(headers.clone());
        }

        let mut response = request.send().await.map_err(|e| Error::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", status)));
        }

        if let Some(parent) = part.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::persistence(parent, e))?;
        }
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| Error::persistence(part, e))?;

        while let Some(chunk) = response.chunk().await.map_err(|e| Error::fetch(url, e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::persistence(part, e))?;
        }
        file.flush().await.map_err(|e| Error::persistence(part, e))?;
        Ok(())
    }
}

/// Sibling of `dest` that no other download writes to
///
/// Concurrent downloads of the same destination each stream into their own
/// part file; only a complete one is renamed over `dest`.
fn part_path(dest: &Path) -> PathBuf {
    static NEXT_PART: AtomicU64 = AtomicU64::new(0);
    let n = NEXT_PART.fetch_add(1, Ordering::Relaxed);
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}-{}.part", std::process::id(), n));
    dest.with_file_name(name)
}

#[async_trait]
impl FetchSource for LiveSource {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        self.send(self.client.get(url), url).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.send(self.client.post(url).json(body), url).await
    }

    async fn download_file(&self, url: &str, dest: &Path) -> bool {
        let Ok(_permit) = self.limiter.acquire().await else {
            return false;
        };

        debug!(url, dest = %dest.display(), "Downloading file");
        let part = part_path(dest);
        let result = match self.stream_to_file(url, &part).await {
            Ok(()) => tokio::fs::rename(&part, dest)
                .await
                .map_err(|e| Error::persistence(dest, e)),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(url, dest = %dest.display(), "File downloaded");
                true
            }
            Err(e) => {
                warn!(url, error = %e, "File download failed");
                if let Err(rm) = tokio::fs::remove_file(&part).await
                    && rm.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(part = %part.display(), error = %rm, "Failed to remove partial download");
                }
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

fn header_map(headers: &HashMap<String, String>, key: &str) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::Config {
            message: format!("invalid header name '{}': {}", name, e),
            key: Some(key.to_string()),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| Error::Config {
            message: format!("invalid value for header '{}': {}", name, e),
            key: Some(key.to_string()),
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
