//! Change detection over the top-level index

use crate::error::{Error, Result};
use crate::source::{FetchSource, is_empty_document};
use crate::store::LocalStore;
use crate::types::{ChangeReport, ClassifyIndex};
use std::sync::Arc;
use tracing::{debug, info};

/// Stable fingerprint of an index
///
/// MD5 over the canonical JSON encoding of the key-sorted `[key, value]`
/// pairs. Equal fingerprints mean "unchanged"; nothing else relies on it.
pub fn fingerprint(index: &ClassifyIndex) -> String {
    let mut pairs: Vec<(&String, &serde_json::Value)> = index.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let encoded: Vec<String> = pairs
        .into_iter()
        .map(|(key, value)| {
            format!(
                "[{},{}]",
                serde_json::Value::String(key.clone()),
                value
            )
        })
        .collect();
    let canonical = format!("[{}]", encoded.join(","));

    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Detects changes of the remote index against the persisted copy
pub struct ChangeDetector {
    source: Arc<dyn FetchSource>,
    store: LocalStore,
    url: String,
    last_fingerprint: Option<String>,
}

impl ChangeDetector {
    /// Detector for `{base_url}/classify`
    pub fn new(source: Arc<dyn FetchSource>, store: LocalStore, base_url: &str) -> Self {
        Self {
            source,
            store,
            url: format!("{}/classify", base_url.trim_end_matches('/')),
            last_fingerprint: None,
        }
    }

    /// Fetch the remote index without touching the store
    pub async fn fetch_index(&self) -> Result<ClassifyIndex> {
        let doc = self.source.get_json(&self.url).await?;
        if is_empty_document(&doc) {
            return Err(Error::EmptyResponse {
                url: self.url.clone(),
            });
        }
        match doc {
            serde_json::Value::Object(index) => Ok(index),
            other => Err(Error::Parse(format!(
                "index from {} is not an object (got {})",
                self.url,
                json_type(&other)
            ))),
        }
    }

    /// Fingerprint of the persisted index, if one exists and parses
    pub async fn persisted_fingerprint(&self) -> Option<String> {
        match self.store.load_json(&self.store.classify_file()).await? {
            serde_json::Value::Object(index) => Some(fingerprint(&index)),
            _ => None,
        }
    }

    /// Fetch, compare, and persist on change
    ///
    /// With nothing persisted the index always counts as changed.
    pub async fn detect(&mut self) -> Result<ChangeReport> {
        let index = self.fetch_index().await?;
        let current = fingerprint(&index);

        let previous = match self.last_fingerprint.take() {
            Some(fp) => Some(fp),
            None => self.persisted_fingerprint().await,
        };
        let changed = previous.as_deref() != Some(current.as_str());

        if changed {
            self.store
                .save_json(&self.store.classify_file(), &index)
                .await?;
            info!(
                fingerprint = %current,
                keys = index.len(),
                "Index changed"
            );
        } else {
            debug!(fingerprint = %current, "Index unchanged");
        }
        self.last_fingerprint = Some(current.clone());

        Ok(ChangeReport {
            changed,
            fingerprint: current,
            key_count: index.len(),
            index,
        })
    }
}

pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
