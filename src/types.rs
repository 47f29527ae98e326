//! Core types for catalog-mirror

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::{Error, ErrorKind};

/// Top-level index: classification key to arbitrary metadata
pub type ClassifyIndex = serde_json::Map<String, serde_json::Value>;

/// Kind of a catalog item; also the first path segment of its detail URL
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Blog article
    Article,
    /// Note section
    Section,
}

impl ContentKind {
    /// Path segment / file prefix for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Section => "section",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(ContentKind::Article),
            "section" => Ok(ContentKind::Section),
            other => Err(Error::InvalidInput(format!(
                "unknown content kind '{other}', expected 'article' or 'section'"
            ))),
        }
    }
}

/// One entry of a month listing
///
/// Identity is `(kind, id)`; title and timestamp are carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentItem {
    /// Item kind
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Item id, unique within its kind
    pub id: i64,
    /// Display title
    pub title: String,
    /// Creation timestamp as published by the catalog
    pub created_time: String,
}

impl ContentItem {
    /// Key used for file names and result maps: `{kind}_{id}`
    pub fn key(&self) -> String {
        format!("{}_{}", self.kind, self.id)
    }
}

/// Pipeline stage, reported when a full run stops early
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Top-level index fetch and fingerprint
    Classify,
    /// Per-key listing expansion
    Months,
    /// Detail fetch and materialization
    Content,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Classify => "classify",
            Stage::Months => "months",
            Stage::Content => "content",
        };
        f.write_str(s)
    }
}

/// Result of a change-detection pass
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangeReport {
    /// Whether the fingerprint differed from the persisted one
    pub changed: bool,
    /// MD5 hex fingerprint of the fetched index
    pub fingerprint: String,
    /// Number of classification keys in the fetched index
    pub key_count: usize,
    /// The fetched index itself
    #[serde(skip)]
    pub index: ClassifyIndex,
}

/// Outcome of loading one classification key's listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ListingOutcome {
    /// Listing available (fetched now or reused from disk)
    Loaded {
        /// True when the persisted listing was reused
        skipped: bool,
        /// Number of descriptors parsed from the listing
        item_count: usize,
    },
    /// Listing could not be loaded
    Failed {
        /// Error classification
        error_kind: ErrorKind,
        /// Error message
        message: String,
    },
}

impl ListingOutcome {
    /// Whether the listing was loaded
    pub fn is_loaded(&self) -> bool {
        matches!(self, ListingOutcome::Loaded { .. })
    }
}

/// Per-key report of an index expansion
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ExpansionReport {
    /// Keys in the index
    pub total_keys: usize,
    /// Keys whose listing loaded
    pub loaded_count: usize,
    /// Keys whose persisted listing was reused
    pub skipped_count: usize,
    /// Descriptors found across all listings
    pub items_found: usize,
    /// Outcome per classification key
    pub results: BTreeMap<String, ListingOutcome>,
}

/// Descriptors produced by an expansion, together with the per-key report
#[derive(Clone, Debug, Default)]
pub struct Expansion {
    /// Concatenation of every parsed listing, in key order
    pub items: Vec<ContentItem>,
    /// Per-key outcomes
    pub report: ExpansionReport,
}

/// Outcome of one embedded image reference
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageOutcome {
    /// URL as it appeared in the body
    pub url: String,
    /// Cache file name, when the image is available locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// True when the file already existed and no download happened
    pub cached: bool,
    /// Whether the reference was rewritten to the local copy
    pub success: bool,
}

/// Outcome of materializing one content item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Body and metadata are on disk
    Materialized {
        /// Item kind
        #[serde(rename = "type")]
        kind: ContentKind,
        /// Item id
        id: i64,
        /// Item title from the listing
        title: String,
        /// Body document path
        #[schema(value_type = String)]
        body_file: PathBuf,
        /// Metadata document path
        #[schema(value_type = String)]
        meta_file: PathBuf,
        /// True when a valid pair already existed and nothing was fetched
        skipped: bool,
        /// Per-reference image results (empty when skipped)
        images: Vec<ImageOutcome>,
    },
    /// Item could not be materialized
    Failed {
        /// Error classification
        error_kind: ErrorKind,
        /// Error message
        message: String,
    },
}

impl ItemOutcome {
    /// Build a failure entry from an error
    pub fn failed(err: &Error) -> Self {
        ItemOutcome::Failed {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Whether the item is on disk
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Materialized { .. })
    }

    /// Whether the item was already on disk before this run
    pub fn is_skipped(&self) -> bool {
        matches!(self, ItemOutcome::Materialized { skipped: true, .. })
    }
}

/// Aggregate result of a materialization pass
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct MaterializeReport {
    /// Descriptors handed to the materializer
    pub total_items: usize,
    /// Items on disk after the pass (includes skipped)
    pub success_count: usize,
    /// Items that were already valid on disk
    pub skipped_count: usize,
    /// Items that failed
    pub failed_count: usize,
    /// Outcome per `{kind}_{id}`
    pub results: BTreeMap<String, ItemOutcome>,
}

impl MaterializeReport {
    /// Record one item outcome and update the counters
    pub fn record(&mut self, key: String, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.success_count += 1;
            if outcome.is_skipped() {
                self.skipped_count += 1;
            }
        } else {
            self.failed_count += 1;
        }
        self.results.insert(key, outcome);
    }
}

/// Result of one pipeline run (a monitor cycle or an explicit full run)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    /// False when a stage failed
    pub success: bool,
    /// Stage that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Error message of the failed stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Change-detection result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeReport>,
    /// Expansion result (absent when expansion did not run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listings: Option<ExpansionReport>,
    /// Materialization result (absent when materialization did not run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MaterializeReport>,
}

impl RunReport {
    /// Mark the run failed at `stage`
    pub fn fail(mut self, stage: Stage, err: &Error) -> Self {
        self.success = false;
        self.failed_stage = Some(stage);
        self.error = Some(err.to_string());
        self
    }
}

/// Snapshot of the poll loop state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MonitorStatus {
    /// Whether the loop is running
    pub running: bool,
    /// Sleep between cycles, in seconds
    pub interval_seconds: u64,
    /// Whether cycles use the offline replay source
    pub offline: bool,
    /// Whether a detected change triggers expansion and materialization
    pub crawl_on_update: bool,
    /// Completed cycles since the service was created
    pub cycles: u64,
    /// When the latest cycle started
    pub last_run_started: Option<DateTime<Utc>>,
    /// When the latest cycle finished
    pub last_run_finished: Option<DateTime<Utc>>,
    /// Result of the latest cycle
    pub last_result: Option<RunReport>,
}

/// Event emitted by the mirror service
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Poll loop started
    MonitorStarted {
        /// Sleep between cycles, in seconds
        interval_seconds: u64,
        /// Whether cycles use the offline replay source
        offline: bool,
    },

    /// Poll loop stopped
    MonitorStopped,

    /// A pipeline run started
    RunStarted {
        /// Cycle number for monitor cycles, None for explicit runs
        #[serde(skip_serializing_if = "Option::is_none")]
        cycle: Option<u64>,
    },

    /// The top-level index fingerprint changed
    IndexChanged {
        /// New fingerprint
        fingerprint: String,
        /// Number of keys in the new index
        key_count: usize,
    },

    /// A content item could not be materialized
    ItemFailed {
        /// `{kind}_{id}`
        key: String,
        /// Error message
        message: String,
    },

    /// A pipeline run finished without a stage failure
    RunCompleted {
        /// Cycle number for monitor cycles, None for explicit runs
        #[serde(skip_serializing_if = "Option::is_none")]
        cycle: Option<u64>,
        /// Whether the index changed
        changed: bool,
        /// Items newly written
        materialized: usize,
        /// Items already on disk
        skipped: usize,
        /// Items that failed
        failed: usize,
    },

    /// A pipeline run stopped at a failing stage
    RunFailed {
        /// Cycle number for monitor cycles, None for explicit runs
        #[serde(skip_serializing_if = "Option::is_none")]
        cycle: Option<u64>,
        /// Failing stage; None when the run itself crashed
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        /// Error message
        error: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_item_parses_listing_entry() {
        let item: ContentItem = serde_json::from_value(serde_json::json!({
            "type": "article",
            "id": 42,
            "title": "Kubernetes networking",
            "created_time": "2024-05-01T08:00:00Z",
            "extra": "ignored"
        }))
        .unwrap();

        assert_eq!(item.kind, ContentKind::Article);
        assert_eq!(item.key(), "article_42");
    }

    #[test]
    fn content_item_rejects_unknown_kind() {
        let res: Result<ContentItem, _> = serde_json::from_value(serde_json::json!({
            "type": "video", "id": 1, "title": "t", "created_time": "x"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn content_kind_from_str() {
        assert_eq!("section".parse::<ContentKind>().unwrap(), ContentKind::Section);
        assert!(matches!(
            "Article".parse::<ContentKind>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn materialize_report_counts_skips_as_successes() {
        let mut report = MaterializeReport::default();
        let ok = |skipped| ItemOutcome::Materialized {
            kind: ContentKind::Article,
            id: 1,
            title: "t".into(),
            body_file: PathBuf::from("a.md"),
            meta_file: PathBuf::from("a_meta.json"),
            skipped,
            images: vec![],
        };
        report.record("article_1".into(), ok(true));
        report.record("article_2".into(), ok(false));
        report.record(
            "article_3".into(),
            ItemOutcome::failed(&Error::Parse("bad".into())),
        );

        assert_eq!(report.success_count, 2);
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.failed_count, 1);
    }

    #[test]
    fn item_outcome_is_tagged_by_status() {
        let json = serde_json::to_value(ItemOutcome::Failed {
            error_kind: ErrorKind::EmptyResponse,
            message: "empty response".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "empty_response");
    }

    #[test]
    fn change_report_does_not_serialize_index() {
        let mut index = ClassifyIndex::new();
        index.insert("2024-01".into(), serde_json::json!(3));
        let report = ChangeReport {
            changed: true,
            fingerprint: "abc".into(),
            key_count: 1,
            index,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("index").is_none());
        assert_eq!(json["key_count"], 1);
    }
}
