//! Content materialization: detail fetch, image rewrite, body/metadata pair

use super::classify::json_type;
use super::images::ImagePipeline;
use crate::error::{Error, ErrorKind, Result};
use crate::source::{FetchSource, is_empty_document};
use crate::store::LocalStore;
use crate::types::{ContentItem, ItemOutcome, MaterializeReport};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Writes each content item as `{kind}_{id}.md` plus `{kind}_{id}_meta.json`
#[derive(Clone)]
pub struct ContentMaterializer {
    source: Arc<dyn FetchSource>,
    store: LocalStore,
    images: ImagePipeline,
    base_url: String,
    batch_size: usize,
}

/// Aborts the spawned item tasks of a batch if the batch future is dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl ContentMaterializer {
    /// Materializer fetching details from `{base_url}/{kind}/{id}`
    pub fn new(
        source: Arc<dyn FetchSource>,
        store: LocalStore,
        base_url: &str,
        batch_size: usize,
    ) -> Result<Self> {
        let images = ImagePipeline::new(source.clone(), store.images_dir())?;
        Ok(Self {
            source,
            store,
            images,
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
        })
    }

    /// Materialize every item in fixed-size batches
    ///
    /// Items of one batch run concurrently; the next batch starts only after
    /// the whole batch finished. A failing or panicking item only affects its
    /// own entry in the report.
    pub async fn materialize(&self, items: &[ContentItem]) -> MaterializeReport {
        let mut report = MaterializeReport {
            total_items: items.len(),
            ..Default::default()
        };

        for (batch_no, batch) in items.chunks(self.batch_size).enumerate() {
            debug!(batch = batch_no + 1, size = batch.len(), "Materializing batch");

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|item| {
                    let this = self.clone();
                    tokio::spawn(async move { this.materialize_item(&item).await })
                })
                .collect();
            let guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
            let joined = join_all(handles).await;
            drop(guard);

            for (item, result) in batch.iter().zip(joined) {
                let outcome = match result {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        warn!(item = %item.key(), error = %e, "Failed to materialize item");
                        ItemOutcome::failed(&e)
                    }
                    Err(join_err) => {
                        warn!(item = %item.key(), error = %join_err, "Item task aborted");
                        ItemOutcome::Failed {
                            error_kind: ErrorKind::Other,
                            message: format!("item task failed: {}", join_err),
                        }
                    }
                };
                report.record(item.key(), outcome);
            }
        }

        info!(
            total = report.total_items,
            succeeded = report.success_count,
            skipped = report.skipped_count,
            failed = report.failed_count,
            "Content materialized"
        );
        report
    }

    /// Materialize one item, optionally discarding the existing pair first
    pub async fn materialize_one(&self, item: &ContentItem, force: bool) -> Result<ItemOutcome> {
        if force {
            self.store.remove_item(item.kind, item.id).await?;
        }
        self.materialize_item(item).await
    }

    async fn materialize_item(&self, item: &ContentItem) -> Result<ItemOutcome> {
        let body_file = self.store.body_file(item.kind, item.id);
        let meta_file = self.store.meta_file(item.kind, item.id);

        if self.store.is_materialized(item.kind, item.id).await {
            debug!(item = %item.key(), "Already materialized, skipping");
            return Ok(ItemOutcome::Materialized {
                kind: item.kind,
                id: item.id,
                title: item.title.clone(),
                body_file,
                meta_file,
                skipped: true,
                images: Vec::new(),
            });
        }

        let url = format!("{}/{}/{}", self.base_url, item.kind, item.id);
        debug!(item = %item.key(), url = %url, "Fetching detail");
        let doc = self.source.get_json(&url).await?;
        if is_empty_document(&doc) {
            return Err(Error::EmptyResponse { url });
        }
        let mut meta = match doc {
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(Error::Parse(format!(
                    "detail for {} is not an object (got {})",
                    item.key(),
                    json_type(&other)
                )));
            }
        };

        let body = match meta.remove("body") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(body)) => body,
            Some(other) => {
                return Err(Error::Parse(format!(
                    "body of {} is not a string (got {})",
                    item.key(),
                    json_type(&other)
                )));
            }
        };

        let (body, images) = self.images.process(&body).await;

        self.store.save_text(&body_file, &body).await?;
        self.store.save_json(&meta_file, &meta).await?;

        debug!(
            item = %item.key(),
            images = images.len(),
            "Materialized item"
        );
        Ok(ItemOutcome::Materialized {
            kind: item.kind,
            id: item.id,
            title: item.title.clone(),
            body_file,
            meta_file,
            skipped: false,
            images,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BASE, ScriptedSource, long_body, temp_store};
    use crate::types::ContentKind;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn item(kind: ContentKind, id: i64) -> ContentItem {
        ContentItem {
            kind,
            id,
            title: format!("{kind} {id}"),
            created_time: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn detail_url(kind: &str, id: i64) -> String {
        format!("{BASE}/{kind}/{id}")
    }

    fn detail(id: i64, body: &str) -> serde_json::Value {
        json!({"id": id, "title": format!("Title {id}"), "tags": ["k8s"], "body": body})
    }

    #[tokio::test]
    async fn writes_body_and_metadata_pair() {
        let (_dir, store) = temp_store();
        let body = long_body("# Hello");
        let source = Arc::new(ScriptedSource::new().json(detail_url("article", 1), detail(1, &body)));
        let materializer = ContentMaterializer::new(source, store.clone(), BASE, 10).unwrap();

        let report = materializer.materialize(&[item(ContentKind::Article, 1)]).await;

        assert_eq!(report.success_count, 1);
        assert_eq!(report.skipped_count, 0);
        let written = std::fs::read_to_string(store.body_file(ContentKind::Article, 1)).unwrap();
        assert_eq!(written, body);
        let meta: serde_json::Value = serde_json::from_slice(
            &std::fs::read(store.meta_file(ContentKind::Article, 1)).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["title"], "Title 1");
        assert!(meta.get("body").is_none());
    }

    #[tokio::test]
    async fn valid_pair_is_skipped_without_network() {
        let (_dir, store) = temp_store();
        store
            .save_text(&store.body_file(ContentKind::Section, 5), &long_body("cached"))
            .await
            .unwrap();
        store
            .save_json(&store.meta_file(ContentKind::Section, 5), &json!({"title": "cached"}))
            .await
            .unwrap();
        let source = Arc::new(ScriptedSource::new());
        let materializer = ContentMaterializer::new(source.clone(), store, BASE, 10).unwrap();

        let report = materializer.materialize(&[item(ContentKind::Section, 5)]).await;

        assert_eq!(report.success_count, 1);
        assert_eq!(report.skipped_count, 1);
        assert!(report.results["section_5"].is_skipped());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn failures_are_isolated_per_item() {
        let (_dir, store) = temp_store();
        let source = Arc::new(
            ScriptedSource::new()
                .json(detail_url("article", 1), detail(1, &long_body("ok")))
                .json(detail_url("article", 2), json!({}))
                .json(detail_url("article", 3), json!([1]))
                .failing(detail_url("article", 4), "HTTP 500")
                .panicking(detail_url("article", 5))
                .json(detail_url("article", 6), json!({"body": 42})),
        );
        let materializer = ContentMaterializer::new(source, store, BASE, 10).unwrap();
        let items: Vec<_> = (1..=6).map(|id| item(ContentKind::Article, id)).collect();

        let report = materializer.materialize(&items).await;

        assert_eq!(report.total_items, 6);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 5);
        let kind_of = |key: &str| match &report.results[key] {
            ItemOutcome::Failed { error_kind, .. } => *error_kind,
            other => panic!("expected failure for {key}, got {other:?}"),
        };
        assert_eq!(kind_of("article_2"), ErrorKind::EmptyResponse);
        assert_eq!(kind_of("article_3"), ErrorKind::Parse);
        assert_eq!(kind_of("article_4"), ErrorKind::Fetch);
        assert_eq!(kind_of("article_5"), ErrorKind::Other);
        assert_eq!(kind_of("article_6"), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn meta_write_failure_fails_the_item() {
        let (_dir, store) = temp_store();
        // A directory where the metadata file should go makes the write fail
        std::fs::create_dir_all(store.meta_file(ContentKind::Article, 1)).unwrap();
        let source = Arc::new(
            ScriptedSource::new().json(detail_url("article", 1), detail(1, &long_body("x"))),
        );
        let materializer = ContentMaterializer::new(source, store.clone(), BASE, 10).unwrap();

        let report = materializer.materialize(&[item(ContentKind::Article, 1)]).await;

        assert_eq!(report.success_count, 0);
        match &report.results["article_1"] {
            ItemOutcome::Failed { error_kind, .. } => {
                assert_eq!(*error_kind, ErrorKind::Persistence)
            }
            other => panic!("expected persistence failure, got {other:?}"),
        }
        assert!(store.body_file(ContentKind::Article, 1).exists());
    }

    #[tokio::test]
    async fn missing_body_is_written_empty() {
        let (_dir, store) = temp_store();
        let source = Arc::new(
            ScriptedSource::new().json(detail_url("section", 2), json!({"id": 2, "title": "no body"})),
        );
        let materializer = ContentMaterializer::new(source, store.clone(), BASE, 10).unwrap();

        let report = materializer.materialize(&[item(ContentKind::Section, 2)]).await;

        assert_eq!(report.success_count, 1);
        assert_eq!(
            std::fs::read_to_string(store.body_file(ContentKind::Section, 2)).unwrap(),
            ""
        );
        // Too small to count as materialized, so the next run fetches again
        assert!(!store.is_materialized(ContentKind::Section, 2).await);
    }

    #[tokio::test]
    async fn batches_cover_every_item() {
        let (_dir, store) = temp_store();
        let mut source = ScriptedSource::new();
        for id in 1..=7 {
            source = source.json(detail_url("article", id), detail(id, &long_body("b")));
        }
        let materializer = ContentMaterializer::new(Arc::new(source), store, BASE, 3).unwrap();
        let items: Vec<_> = (1..=7).map(|id| item(ContentKind::Article, id)).collect();

        let report = materializer.materialize(&items).await;

        assert_eq!(report.success_count, 7);
        assert_eq!(report.results.len(), 7);
    }

    /// Source that sleeps per fetch and logs `s{id}` / `e{id}` around it
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl FetchSource for SlowSource {
        async fn get_json(&self, url: &str) -> crate::Result<serde_json::Value> {
            let id: i64 = url.rsplit('/').next().unwrap().parse().unwrap();
            self.log.lock().unwrap().push(format!("s{id}"));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis([30, 10, 20][id as usize % 3])).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("e{id}"));
            Ok(detail(id, &long_body("slow")))
        }

        async fn post_json(
            &self,
            url: &str,
            _body: &serde_json::Value,
        ) -> crate::Result<serde_json::Value> {
            self.get_json(url).await
        }

        async fn download_file(&self, _url: &str, _dest: &Path) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn batch_finishes_before_next_starts() {
        let (_dir, store) = temp_store();
        let source = Arc::new(SlowSource::default());
        let materializer = ContentMaterializer::new(source.clone(), store, BASE, 3).unwrap();
        let items: Vec<_> = (1..=7).map(|id| item(ContentKind::Article, id)).collect();

        let report = materializer.materialize(&items).await;

        assert_eq!(report.success_count, 7);
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);

        let log = source.log.lock().unwrap().clone();
        let pos = |entry: String| log.iter().position(|e| *e == entry).unwrap();
        for (batch, next) in [(1..=3, 4..=6), (4..=6, 7..=7)] {
            let last_end = batch.map(|id| pos(format!("e{id}"))).max().unwrap();
            let first_start = next.map(|id| pos(format!("s{id}"))).min().unwrap();
            assert!(last_end < first_start, "batches overlap: {log:?}");
        }
    }

    #[tokio::test]
    async fn force_refetches_valid_pair() {
        let (_dir, store) = temp_store();
        store
            .save_text(&store.body_file(ContentKind::Article, 8), &long_body("old"))
            .await
            .unwrap();
        store
            .save_json(&store.meta_file(ContentKind::Article, 8), &json!({"title": "old"}))
            .await
            .unwrap();
        let source = Arc::new(
            ScriptedSource::new().json(detail_url("article", 8), detail(8, &long_body("new"))),
        );
        let materializer = ContentMaterializer::new(source.clone(), store.clone(), BASE, 10).unwrap();
        let target = item(ContentKind::Article, 8);

        let kept = materializer.materialize_one(&target, false).await.unwrap();
        assert!(kept.is_skipped());
        assert!(source.calls().is_empty());

        let forced = materializer.materialize_one(&target, true).await.unwrap();
        assert!(forced.is_success() && !forced.is_skipped());
        let body = std::fs::read_to_string(store.body_file(ContentKind::Article, 8)).unwrap();
        assert!(body.starts_with("new"));
    }

    #[tokio::test]
    async fn images_in_body_are_rewritten() {
        let (_dir, store) = temp_store();
        let img = "https://cdn.nlark.com/yuque/0/2024/png/1.png?x-oss-process=a";
        let body = long_body(&format!("![diagram]({img})"));
        let source = Arc::new(
            ScriptedSource::new()
                .json(detail_url("article", 1), detail(1, &body))
                .download(img, b"png"),
        );
        let materializer = ContentMaterializer::new(source, store.clone(), BASE, 10).unwrap();

        let report = materializer.materialize(&[item(ContentKind::Article, 1)]).await;

        let ItemOutcome::Materialized { images, .. } = &report.results["article_1"] else {
            panic!("expected success");
        };
        assert_eq!(images.len(), 1);
        let written = std::fs::read_to_string(store.body_file(ContentKind::Article, 1)).unwrap();
        assert!(written.contains("![diagram](./images/"));
        assert!(!written.contains(img));
    }
}
