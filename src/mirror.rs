//! The mirror service object
//!
//! [`CatalogMirror`] is constructed once at process start and shared (as
//! `Arc`) with every consumer. It owns the configuration, the local store,
//! the event channel and the poll loop, and opens a fresh [`FetchSource`]
//! for every run so no connection pool outlives the run that created it.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::monitor::{CycleRunner, MonitorService, MonitorSettings, publish_report};
use crate::pipeline::Pipeline;
use crate::source::{FetchMode, FetchSource, open_source};
use crate::store::LocalStore;
use crate::types::{
    ChangeReport, ContentItem, ContentKind, Event, ItemOutcome, RunReport, Stage,
};
use crate::verify::{Verifier, VerifyReport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Title given to items crawled outside of any listing
fn ad_hoc_title(kind: ContentKind, id: i64) -> String {
    format!("{}-{}", kind, id)
}

const AD_HOC_CREATED_TIME: &str = "1970-01-01T00:00:00Z";

/// Main entry point: control surface over the mirror pipeline
#[derive(Clone)]
pub struct CatalogMirror {
    config: Arc<Config>,
    store: LocalStore,
    event_tx: broadcast::Sender<Event>,
    monitor: MonitorService,
}

/// Runs monitor cycles against a fresh source per cycle
struct MirrorCycles {
    config: Arc<Config>,
    store: LocalStore,
}

#[async_trait]
impl CycleRunner for MirrorCycles {
    async fn run_cycle(&self, offline: bool, crawl_on_update: bool) -> RunReport {
        let source = match open_source(&self.config, FetchMode::from_offline(offline)) {
            Ok(source) => source,
            Err(e) => return RunReport::default().fail(Stage::Classify, &e),
        };
        match Pipeline::new(source, self.store.clone(), &self.config) {
            Ok(mut pipeline) => pipeline.run_cycle(crawl_on_update).await,
            Err(e) => RunReport::default().fail(Stage::Classify, &e),
        }
    }
}

impl CatalogMirror {
    /// Validate `config`, create the store layout and build the (stopped) monitor
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let store = LocalStore::new(config.storage.clone());
        store.ensure_layout().await?;

        let config = Arc::new(config);
        let (event_tx, _rx) = broadcast::channel(1000);

        let runner = Arc::new(MirrorCycles {
            config: config.clone(),
            store: store.clone(),
        });
        let defaults = MonitorSettings {
            interval_seconds: config.monitor.default_interval.as_secs(),
            offline: false,
            crawl_on_update: config.monitor.crawl_on_update,
        };
        let monitor = MonitorService::new(runner, defaults, event_tx.clone());

        tracing::info!(
            data_dir = %config.storage.data_dir.display(),
            base_url = %config.remote.base_url,
            "Catalog mirror ready"
        );

        Ok(Self {
            config,
            store,
            event_tx,
            monitor,
        })
    }

    /// Subscribe to mirror events
    ///
    /// Slow subscribers miss events once the channel buffer (1000) fills;
    /// they see `RecvError::Lagged` and can continue.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The local store
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The poll loop
    pub fn monitor(&self) -> &MonitorService {
        &self.monitor
    }

    /// Open a source for one run; it is released when the caller drops it
    pub fn open_source(&self, offline: bool) -> Result<Arc<dyn FetchSource>> {
        open_source(&self.config, FetchMode::from_offline(offline))
    }

    fn pipeline(&self, offline: bool) -> Result<Pipeline> {
        Pipeline::new(self.open_source(offline)?, self.store.clone(), &self.config)
    }

    /// Fetch the index and report whether it changed since the last persisted copy
    pub async fn check_for_update(&self, offline: bool) -> Result<ChangeReport> {
        let mut pipeline = self.pipeline(offline)?;
        let change = pipeline.detector().detect().await?;
        if change.changed {
            self.event_tx
                .send(Event::IndexChanged {
                    fingerprint: change.fingerprint.clone(),
                    key_count: change.key_count,
                })
                .ok();
        }
        Ok(change)
    }

    /// Run every stage regardless of change
    ///
    /// Failures are reported in the returned [`RunReport`], including a
    /// source that cannot be opened (recorded against the index stage).
    pub async fn run_full(&self, offline: bool) -> RunReport {
        self.event_tx.send(Event::RunStarted { cycle: None }).ok();
        let report = match self.pipeline(offline) {
            Ok(mut pipeline) => pipeline.run_full().await,
            Err(e) => RunReport::default().fail(Stage::Classify, &e),
        };
        publish_report(&self.event_tx, None, &report);
        report
    }

    /// Materialize one item by kind and id, optionally discarding the local copy first
    pub async fn crawl_item(
        &self,
        kind: ContentKind,
        id: i64,
        force: bool,
        offline: bool,
    ) -> Result<ItemOutcome> {
        let item = ContentItem {
            kind,
            id,
            title: ad_hoc_title(kind, id),
            created_time: AD_HOC_CREATED_TIME.to_string(),
        };
        let pipeline = self.pipeline(offline)?;
        match pipeline.materialize_one(&item, force).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(item = %item.key(), error = %e, "Single item crawl failed");
                self.event_tx
                    .send(Event::ItemFailed {
                        key: item.key(),
                        message: e.to_string(),
                    })
                    .ok();
                Ok(ItemOutcome::failed(&e))
            }
        }
    }

    /// Completeness report over the local store
    pub async fn verify(&self, detail: bool) -> Result<VerifyReport> {
        let verifier = Verifier::new(self.store.clone())?;
        tokio::task::spawn_blocking(move || verifier.verify(detail))
            .await
            .map_err(|e| Error::Other(format!("verification task failed: {}", e)))
    }

    /// Stop the poll loop and wait for it to exit
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down catalog mirror");
        self.monitor.stop().await;
        Ok(())
    }
}
