//! Common test utilities for catalog-mirror integration tests

#![allow(dead_code)]

use catalog_mirror::{CatalogMirror, Config};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Canned catalog responses: one key, one article and one section
pub fn fixture_response_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("responses")
}

/// Config with a fresh temp data dir, replaying the fixture responses
///
/// Returns the config and temp directory (keep temp_dir alive for test duration)
pub fn offline_config() -> (Config, TempDir) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let mut config = Config::default();
    config.storage.data_dir = temp_dir.path().join("data");
    config.offline.response_dir = fixture_response_dir();
    (config, temp_dir)
}

/// Mirror over [`offline_config`]
pub async fn offline_mirror() -> (CatalogMirror, TempDir) {
    let (config, temp_dir) = offline_config();
    let mirror = CatalogMirror::new(config)
        .await
        .expect("mirror should start with the offline config");
    (mirror, temp_dir)
}

/// Receive events until `pred` matches or `timeout` elapses
pub async fn wait_for_event<T, F>(
    rx: &mut broadcast::Receiver<T>,
    timeout: Duration,
    mut pred: F,
) -> Option<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
