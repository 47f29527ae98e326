//! Shared test helpers: an in-memory fetch source and a temp-dir store.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::source::FetchSource;
use crate::store::LocalStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub(crate) const BASE: &str = "http://catalog.test/v1/blog";

enum Scripted {
    Json(serde_json::Value),
    Fail(String),
    Panic,
}

/// Fetch source answering from a fixed script and logging every call.
pub(crate) struct ScriptedSource {
    responses: HashMap<String, Scripted>,
    downloads: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self {
            responses: HashMap::new(),
            downloads: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn json(mut self, url: impl Into<String>, value: serde_json::Value) -> Self {
        self.responses.insert(url.into(), Scripted::Json(value));
        self
    }

    pub(crate) fn failing(mut self, url: impl Into<String>, message: &str) -> Self {
        self.responses
            .insert(url.into(), Scripted::Fail(message.to_string()));
        self
    }

    pub(crate) fn panicking(mut self, url: impl Into<String>) -> Self {
        self.responses.insert(url.into(), Scripted::Panic);
        self
    }

    pub(crate) fn download(mut self, url: impl Into<String>, bytes: &[u8]) -> Self {
        self.downloads.insert(url.into(), bytes.to_vec());
        self
    }

    /// Every GET/POST/download URL seen so far, in call order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl FetchSource for ScriptedSource {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(Scripted::Json(value)) => Ok(value.clone()),
            Some(Scripted::Fail(message)) => Err(Error::fetch(url, message)),
            Some(Scripted::Panic) => panic!("scripted panic for {url}"),
            None => Err(Error::fetch(url, "no scripted response")),
        }
    }

    async fn post_json(&self, url: &str, _body: &serde_json::Value) -> Result<serde_json::Value> {
        self.get_json(url).await
    }

    async fn download_file(&self, url: &str, dest: &Path) -> bool {
        self.calls.lock().unwrap().push(url.to_string());
        match self.downloads.get(url) {
            Some(bytes) => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(dest, bytes).unwrap();
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Store rooted in a fresh temp dir; keep the `TempDir` alive for the test.
pub(crate) fn temp_store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(StorageConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    (dir, store)
}

/// A body long enough to pass the materialization threshold
pub(crate) fn long_body(prefix: &str) -> String {
    format!("{prefix}\n\n{}", "Lorem ipsum dolor sit amet. ".repeat(8))
}
