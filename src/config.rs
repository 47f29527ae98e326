//! Configuration types for catalog-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Main configuration for [`CatalogMirror`](crate::CatalogMirror)
///
/// Fields are organized into sub-configs:
/// - [`remote`](RemoteConfig) - catalog API location, timeouts, headers
/// - [`storage`](StorageConfig) - on-disk layout and validity thresholds
/// - [`pipeline`](PipelineConfig) - materializer batching
/// - [`offline`](OfflineConfig) - canned responses for the replay source
/// - [`monitor`](MonitorConfig) - poll loop defaults
/// - [`server`](ServerIntegrationConfig) - REST API
///
/// Every field has a default, so `{}` is a valid configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote catalog API settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Local store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Materializer settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Offline replay settings
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Poll loop defaults
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.remote.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid base URL '{}'", self.remote.base_url),
                key: Some("remote.base_url".to_string()),
            });
        }
        if self.remote.max_concurrent_requests == 0 {
            return Err(Error::Config {
                message: "max_concurrent_requests must be at least 1".to_string(),
                key: Some("remote.max_concurrent_requests".to_string()),
            });
        }
        if self.remote.max_concurrent_requests > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(Error::Config {
                message: format!(
                    "max_concurrent_requests must not exceed {}",
                    tokio::sync::Semaphore::MAX_PERMITS
                ),
                key: Some("remote.max_concurrent_requests".to_string()),
            });
        }
        if self.remote.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request_timeout must be greater than zero".to_string(),
                key: Some("remote.request_timeout".to_string()),
            });
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".to_string(),
                key: Some("pipeline.batch_size".to_string()),
            });
        }
        Ok(())
    }
}

/// Remote catalog API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the catalog API, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Maximum in-flight network operations per fetch source (default: 5)
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Headers sent with API requests and ordinary downloads
    #[serde(default = "default_headers")]
    pub headers: HashMap<String, String>,

    /// Headers sent with downloads from image CDN hosts
    #[serde(default = "default_image_headers")]
    pub image_headers: HashMap<String, String>,

    /// URL substrings that select [`image_headers`](Self::image_headers)
    #[serde(default = "default_image_header_hosts")]
    pub image_header_hosts: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
            headers: default_headers(),
            image_headers: default_image_headers(),
            image_header_hosts: default_image_header_hosts(),
        }
    }
}

/// Local store layout
///
/// ```text
/// {data_dir}/classify.json
/// {data_dir}/months/{key}.json
/// {data_dir}/content/{kind}_{id}.md
/// {data_dir}/content/{kind}_{id}_meta.json
/// {data_dir}/content/images/{md5}{ext}
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the local store (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// A body file must be strictly larger than this to count as materialized (default: 100)
    #[serde(default = "default_min_body_bytes")]
    pub min_body_bytes: u64,

    /// A metadata file must be strictly larger than this to count as materialized (default: 10)
    #[serde(default = "default_min_meta_bytes")]
    pub min_meta_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            min_body_bytes: default_min_body_bytes(),
            min_meta_bytes: default_min_meta_bytes(),
        }
    }
}

impl StorageConfig {
    /// Persisted top-level index
    pub fn classify_file(&self) -> PathBuf {
        self.data_dir.join("classify.json")
    }

    /// Directory holding one listing per classification key
    pub fn months_dir(&self) -> PathBuf {
        self.data_dir.join("months")
    }

    /// Directory holding materialized body/metadata pairs
    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }

    /// Image cache, placed inside the content directory so `./images/` links resolve
    pub fn images_dir(&self) -> PathBuf {
        self.content_dir().join("images")
    }
}

/// Content materializer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Items materialized per batch; the next batch waits for the previous one (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Offline replay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Directory containing classify.json, classify_month.json, article.json, section.json
    #[serde(default = "default_response_dir")]
    pub response_dir: PathBuf,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            response_dir: default_response_dir(),
        }
    }
}

/// Poll loop defaults, applied when a start request leaves a field unset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between cycles (default: 3600 seconds)
    #[serde(default = "default_monitor_interval", with = "duration_serde")]
    pub default_interval: Duration,

    /// Expand and materialize when the index changes (default: true)
    #[serde(default = "default_true")]
    pub crawl_on_update: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval: default_monitor_interval(),
            crawl_on_update: true,
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://api.cuiliangblog.cn/v1/blog".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_headers() -> HashMap<String, String> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        ("Accept", "application/json, text/plain, */*"),
        ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
        ("Referer", "https://www.cuiliangblog.cn/"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_image_headers() -> HashMap<String, String> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        (
            "Accept",
            "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        ),
        ("Referer", "https://www.yuque.com/"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_image_header_hosts() -> Vec<String> {
    vec!["cdn.nlark.com".to_string(), "yuque.com".to_string()]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_min_body_bytes() -> u64 {
    100
}

fn default_min_meta_bytes() -> u64 {
    10
}

fn default_batch_size() -> usize {
    10
}

fn default_response_dir() -> PathBuf {
    PathBuf::from("design").join("response")
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
