//! The mirror pipeline
//!
//! One run is: [`ChangeDetector`] → [`IndexExpander`] → [`ContentMaterializer`],
//! with [`ImagePipeline`] applied to every fetched body. All stages of a run
//! share one [`FetchSource`], so its concurrency gate is scoped to the run.

mod classify;
mod content;
mod images;
mod months;

pub use classify::{ChangeDetector, fingerprint};
pub use content::ContentMaterializer;
pub use images::{
    ImagePipeline, LOCAL_IMAGE_PREFIX, cache_file_name, canonical_image_url, image_extension,
};
pub use months::IndexExpander;

pub(crate) use images::image_ref_regex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::FetchSource;
use crate::store::LocalStore;
use crate::types::{ContentItem, ItemOutcome, RunReport, Stage};
use std::sync::Arc;
use tracing::{error, info};

/// All stages wired to one fetch source
pub struct Pipeline {
    detector: ChangeDetector,
    expander: IndexExpander,
    materializer: ContentMaterializer,
}

impl Pipeline {
    /// Wire every stage to `source` and `store`
    pub fn new(source: Arc<dyn FetchSource>, store: LocalStore, config: &Config) -> Result<Self> {
        let base_url = config.remote.base_url.as_str();
        Ok(Self {
            detector: ChangeDetector::new(source.clone(), store.clone(), base_url),
            expander: IndexExpander::new(source.clone(), store.clone(), base_url),
            materializer: ContentMaterializer::new(
                source,
                store,
                base_url,
                config.pipeline.batch_size,
            )?,
        })
    }

    /// Change detector of this run
    pub fn detector(&mut self) -> &mut ChangeDetector {
        &mut self.detector
    }

    /// One poll cycle: detect, then expand and materialize only on change
    pub async fn run_cycle(&mut self, crawl_on_update: bool) -> RunReport {
        let change = match self.detector.detect().await {
            Ok(change) => change,
            Err(e) => {
                error!(error = %e, "Change detection failed");
                return RunReport::default().fail(Stage::Classify, &e);
            }
        };

        let mut report = RunReport {
            success: true,
            ..Default::default()
        };
        if change.changed && crawl_on_update {
            let expansion = self.expander.expand(&change.index).await;
            let content = self.materializer.materialize(&expansion.items).await;
            report.listings = Some(expansion.report);
            report.content = Some(content);
        } else {
            info!(changed = change.changed, "Skipping expansion");
        }
        report.change = Some(change);
        report
    }

    /// Every stage, regardless of whether the index changed
    ///
    /// Stops at the first failing stage: the index cannot be fetched, or no
    /// listing of a non-empty index could be loaded.
    pub async fn run_full(&mut self) -> RunReport {
        let mut report = RunReport::default();

        let change = match self.detector.detect().await {
            Ok(change) => change,
            Err(e) => {
                error!(error = %e, "Index stage failed");
                return report.fail(Stage::Classify, &e);
            }
        };

        let expansion = self.expander.expand(&change.index).await;
        report.change = Some(change);
        let listings_failed =
            expansion.report.total_keys > 0 && expansion.report.loaded_count == 0;
        report.listings = Some(expansion.report);
        if listings_failed {
            let e = Error::Other("no listing could be loaded".to_string());
            error!(error = %e, "Listing stage failed");
            return report.fail(Stage::Months, &e);
        }

        report.content = Some(self.materializer.materialize(&expansion.items).await);
        report.success = true;
        report
    }

    /// Materialize a single item outside of any listing
    pub async fn materialize_one(&self, item: &ContentItem, force: bool) -> Result<ItemOutcome> {
        self.materializer.materialize_one(item, force).await
    }
}
