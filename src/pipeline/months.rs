//! Index expansion: one listing per classification key

use super::classify::json_type;
use crate::error::{Error, Result};
use crate::source::{FetchSource, is_empty_document};
use crate::store::LocalStore;
use crate::types::{ClassifyIndex, ContentItem, Expansion, ListingOutcome};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Expands the top-level index into content-item descriptors
///
/// A persisted listing that is a non-empty array is reused as-is and never
/// revalidated against the remote side.
pub struct IndexExpander {
    source: Arc<dyn FetchSource>,
    store: LocalStore,
    base_url: String,
}

impl IndexExpander {
    /// Expander fetching listings from `{base_url}/classify/?month={key}`
    pub fn new(source: Arc<dyn FetchSource>, store: LocalStore, base_url: &str) -> Self {
        Self {
            source,
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Load every key's listing concurrently and flatten the descriptors
    ///
    /// Never fails: per-key problems are recorded in the report. Descriptors
    /// appearing under several keys are kept as often as they appear.
    pub async fn expand(&self, index: &ClassifyIndex) -> Expansion {
        let loads = index.keys().map(|key| async move {
            let result = self.load_listing(key).await;
            (key.clone(), result)
        });
        let loaded = join_all(loads).await;

        let mut expansion = Expansion::default();
        expansion.report.total_keys = index.len();

        for (key, result) in loaded {
            let outcome = match result {
                Ok((entries, skipped)) => {
                    let items = parse_listing(&key, entries);
                    expansion.report.loaded_count += 1;
                    if skipped {
                        expansion.report.skipped_count += 1;
                    }
                    let item_count = items.len();
                    expansion.items.extend(items);
                    ListingOutcome::Loaded {
                        skipped,
                        item_count,
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to load listing");
                    ListingOutcome::Failed {
                        error_kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            expansion.report.results.insert(key, outcome);
        }
        expansion.report.items_found = expansion.items.len();

        info!(
            keys = expansion.report.total_keys,
            loaded = expansion.report.loaded_count,
            reused = expansion.report.skipped_count,
            items = expansion.report.items_found,
            "Index expanded"
        );
        expansion
    }

    /// Listing entries for `key` and whether the persisted copy was reused
    async fn load_listing(&self, key: &str) -> Result<(Vec<serde_json::Value>, bool)> {
        if !is_safe_key(key) {
            return Err(Error::Parse(format!(
                "classification key '{}' is not a valid file name",
                key
            )));
        }

        let path = self.store.listing_file(key);
        if let Some(serde_json::Value::Array(entries)) = self.store.load_json(&path).await
            && !entries.is_empty()
        {
            debug!(key, "Reusing persisted listing");
            return Ok((entries, true));
        }

        let url = format!(
            "{}/classify/?month={}",
            self.base_url,
            urlencoding::encode(key)
        );
        let doc = self.source.get_json(&url).await?;
        if is_empty_document(&doc) {
            return Err(Error::EmptyResponse { url });
        }
        self.store.save_json(&path, &doc).await?;

        match doc {
            serde_json::Value::Array(entries) => Ok((entries, false)),
            other => Err(Error::Parse(format!(
                "listing for '{}' is not an array (got {})",
                key,
                json_type(&other)
            ))),
        }
    }
}

fn parse_listing(key: &str, entries: Vec<serde_json::Value>) -> Vec<ContentItem> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ContentItem>(entry.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(key, entry = %entry, error = %e, "Dropping malformed listing entry");
                None
            }
        })
        .collect()
}

/// A key must be usable as a single file name inside the listings directory
fn is_safe_key(key: &str) -> bool {
    !key.is_empty() && !key.contains("..") && !key.contains(['/', '\\', '\0'])
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_helpers::{BASE, ScriptedSource, temp_store};
    use crate::types::ContentKind;
    use serde_json::json;

    fn index(keys: &[&str]) -> ClassifyIndex {
        keys.iter().map(|k| (k.to_string(), json!(1))).collect()
    }

    fn entry(kind: &str, id: i64) -> serde_json::Value {
        json!({"type": kind, "id": id, "title": format!("{kind} {id}"), "created_time": "2024-01-02"})
    }

    fn listing_url(key: &str) -> String {
        format!("{BASE}/classify/?month={key}")
    }

    #[tokio::test]
    async fn fetches_persists_and_flattens_listings() {
        let (_dir, store) = temp_store();
        let source = Arc::new(
            ScriptedSource::new()
                .json(listing_url("2024-01"), json!([entry("article", 1), entry("section", 2)]))
                .json(listing_url("2024-02"), json!([entry("article", 3)])),
        );
        let expander = IndexExpander::new(source.clone(), store.clone(), BASE);

        let expansion = expander.expand(&index(&["2024-01", "2024-02"])).await;

        assert_eq!(expansion.items.len(), 3);
        assert_eq!(expansion.items[1].kind, ContentKind::Section);
        assert_eq!(expansion.report.loaded_count, 2);
        assert_eq!(expansion.report.skipped_count, 0);
        assert!(store.listing_file("2024-01").exists());
        assert_eq!(
            expansion.report.results["2024-02"],
            ListingOutcome::Loaded {
                skipped: false,
                item_count: 1
            }
        );
    }

    #[tokio::test]
    async fn persisted_listing_is_reused_without_fetch() {
        let (_dir, store) = temp_store();
        store
            .save_json(&store.listing_file("2024-01"), &json!([entry("article", 9)]))
            .await
            .unwrap();
        let source = Arc::new(ScriptedSource::new());
        let expander = IndexExpander::new(source.clone(), store, BASE);

        let expansion = expander.expand(&index(&["2024-01"])).await;

        assert_eq!(expansion.items[0].id, 9);
        assert_eq!(expansion.report.skipped_count, 1);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_persisted_listing_is_refetched() {
        let (_dir, store) = temp_store();
        store
            .save_json(&store.listing_file("2024-01"), &json!([]))
            .await
            .unwrap();
        let source = Arc::new(
            ScriptedSource::new().json(listing_url("2024-01"), json!([entry("article", 1)])),
        );
        let expander = IndexExpander::new(source.clone(), store, BASE);

        let expansion = expander.expand(&index(&["2024-01"])).await;

        assert_eq!(expansion.items.len(), 1);
        assert_eq!(source.call_count(&listing_url("2024-01")), 1);
    }

    #[tokio::test]
    async fn per_key_failures_do_not_stop_other_keys() {
        let (_dir, store) = temp_store();
        let source = Arc::new(
            ScriptedSource::new()
                .json(listing_url("2024-01"), json!([entry("article", 1)]))
                .json(listing_url("2024-02"), json!([]))
                .json(listing_url("2024-03"), json!({"unexpected": true}))
                .failing(listing_url("2024-04"), "timeout"),
        );
        let expander = IndexExpander::new(source, store.clone(), BASE);

        let expansion = expander
            .expand(&index(&["2024-01", "2024-02", "2024-03", "2024-04"]))
            .await;

        assert_eq!(expansion.items.len(), 1);
        assert_eq!(expansion.report.loaded_count, 1);
        let kind_of = |key: &str| match &expansion.report.results[key] {
            ListingOutcome::Failed { error_kind, .. } => *error_kind,
            other => panic!("expected failure for {key}, got {other:?}"),
        };
        assert_eq!(kind_of("2024-02"), ErrorKind::EmptyResponse);
        assert_eq!(kind_of("2024-03"), ErrorKind::Parse);
        assert_eq!(kind_of("2024-04"), ErrorKind::Fetch);
        assert!(!store.listing_file("2024-02").exists());
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped_individually() {
        let (_dir, store) = temp_store();
        let source = Arc::new(ScriptedSource::new().json(
            listing_url("2024-01"),
            json!([entry("article", 1), {"type": "video", "id": 2}, {"id": "x"}, entry("section", 4)]),
        ));
        let expander = IndexExpander::new(source, store, BASE);

        let expansion = expander.expand(&index(&["2024-01"])).await;

        let ids: Vec<i64> = expansion.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected_without_fetch() {
        let (_dir, store) = temp_store();
        let source = Arc::new(ScriptedSource::new());
        let expander = IndexExpander::new(source.clone(), store, BASE);

        let expansion = expander.expand(&index(&["../etc", "a/b"])).await;

        assert!(expansion.items.is_empty());
        assert!(expansion.report.results.values().all(|o| !o.is_loaded()));
        assert!(source.calls().is_empty());
    }
}
