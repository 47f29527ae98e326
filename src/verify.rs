//! Completeness report over the local store
//!
//! Verification reads the store only and never fails: unreadable documents
//! show up as problems in the report.

use crate::pipeline::{LOCAL_IMAGE_PREFIX, image_ref_regex};
use crate::store::LocalStore;
use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Maximum broken image names listed per item issue
const MAX_BROKEN_PER_ITEM: usize = 5;

/// Full verification report
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyReport {
    /// True when every section is ok
    pub ok: bool,
    /// Top-level index
    pub classify: ClassifyCheck,
    /// Per-key listings
    pub months: MonthsCheck,
    /// Body/metadata pairing and image references
    pub content: ContentCheck,
    /// Per expected item completeness
    pub items: ItemsCheck,
}

/// Top-level index check
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyCheck {
    /// Whether the index document exists
    pub exists: bool,
    /// Number of keys in the index
    pub month_count: usize,
    /// Read or parse error, if any
    pub error: Option<String>,
}

/// Listing files check
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MonthsCheck {
    /// At least one listing exists and none referenced by the index is missing
    pub ok: bool,
    /// Listing files on disk
    pub files: Vec<String>,
    /// Index keys without a listing file
    pub missing: Vec<String>,
}

/// Content directory check
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ContentCheck {
    /// Every body has metadata and vice versa
    pub ok: bool,
    /// Stems with metadata but no body
    pub missing_md: Vec<String>,
    /// Stems with a body but no metadata
    pub missing_meta: Vec<String>,
    /// `{body file}:{image file}` for local image links without a cached file
    pub broken_images: Vec<String>,
}

/// Per-item completeness summary
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemsCheck {
    /// No expected item has an issue
    pub ok: bool,
    /// Distinct `(type, id)` pairs across all listings
    pub total_expected: usize,
    /// Items with valid body, valid metadata and no broken images
    pub complete_count: usize,
    /// Items with at least one problem
    pub incomplete_count: usize,
    /// Problems per item, only when detail was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<ItemIssue>>,
}

/// Problems of one expected item
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemIssue {
    /// Item type from the listing
    #[serde(rename = "type")]
    pub kind: String,
    /// Item id
    pub id: i64,
    /// Body missing or below threshold
    pub missing_md: bool,
    /// Metadata missing or below threshold
    pub missing_meta: bool,
    /// First few image files referenced but not cached
    pub broken_images: Vec<String>,
}

/// Checks the local store against its own index and listings
pub struct Verifier {
    store: LocalStore,
    pattern: Regex,
}

impl Verifier {
    /// Verifier for `store`
    pub fn new(store: LocalStore) -> Result<Self> {
        Ok(Self {
            store,
            pattern: image_ref_regex()?,
        })
    }

    /// Build the report; `detail` adds the per-item issue list
    pub fn verify(&self, detail: bool) -> VerifyReport {
        let (classify, keys) = self.check_classify();
        let months = self.check_months(&keys);
        let content = self.check_content();
        let items = self.check_items(detail);

        let ok = classify.exists && months.ok && content.ok && items.ok;
        tracing::debug!(
            ok,
            expected = items.total_expected,
            complete = items.complete_count,
            "Verification finished"
        );
        VerifyReport {
            ok,
            classify,
            months,
            content,
            items,
        }
    }

    fn check_classify(&self) -> (ClassifyCheck, Vec<String>) {
        let path = self.store.classify_file();
        if !path.exists() {
            return (
                ClassifyCheck {
                    exists: false,
                    month_count: 0,
                    error: None,
                },
                Vec::new(),
            );
        }

        match read_json(&path) {
            Ok(serde_json::Value::Object(index)) => {
                let keys: Vec<String> = index.keys().cloned().collect();
                (
                    ClassifyCheck {
                        exists: true,
                        month_count: keys.len(),
                        error: None,
                    },
                    keys,
                )
            }
            Ok(_) => (
                ClassifyCheck {
                    exists: true,
                    month_count: 0,
                    error: None,
                },
                Vec::new(),
            ),
            Err(e) => (
                ClassifyCheck {
                    exists: true,
                    month_count: 0,
                    error: Some(e),
                },
                Vec::new(),
            ),
        }
    }

    fn check_months(&self, keys: &[String]) -> MonthsCheck {
        let files = list_files(&self.store.config().months_dir(), ".json");
        let on_disk: HashSet<String> = files
            .iter()
            .filter_map(|f| f.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !on_disk.contains(*k))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        MonthsCheck {
            ok: missing.is_empty() && !files.is_empty(),
            files: files.iter().map(|f| f.display().to_string()).collect(),
            missing,
        }
    }

    fn check_content(&self) -> ContentCheck {
        let dir = self.store.config().content_dir();
        let bodies = list_files(&dir, ".md");
        let body_stems: BTreeSet<String> = bodies.iter().filter_map(|p| stem(p, ".md")).collect();
        let meta_stems: BTreeSet<String> = list_files(&dir, "_meta.json")
            .iter()
            .filter_map(|p| stem(p, "_meta.json"))
            .collect();

        let mut broken_images = Vec::new();
        for body in &bodies {
            let Ok(text) = std::fs::read(body) else {
                continue;
            };
            let name = body
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for image in self.broken_images(&String::from_utf8_lossy(&text)) {
                broken_images.push(format!("{name}:{image}"));
            }
        }

        let missing_md: Vec<String> = meta_stems.difference(&body_stems).cloned().collect();
        let missing_meta: Vec<String> = body_stems.difference(&meta_stems).cloned().collect();
        ContentCheck {
            ok: missing_md.is_empty() && missing_meta.is_empty(),
            missing_md,
            missing_meta,
            broken_images,
        }
    }

    fn check_items(&self, detail: bool) -> ItemsCheck {
        let expected = self.expected_items();
        let mut issues = Vec::new();
        let mut complete_count = 0;
        let storage = self.store.config();
        let content_dir = storage.content_dir();

        for (kind, id) in &expected {
            let body = content_dir.join(format!("{kind}_{id}.md"));
            let meta = content_dir.join(format!("{kind}_{id}_meta.json"));
            let has_md = file_len(&body).is_some_and(|len| len > storage.min_body_bytes);
            let has_meta = file_len(&meta).is_some_and(|len| len > storage.min_meta_bytes);

            let broken = if has_md {
                std::fs::read(&body)
                    .map(|text| self.broken_images(&String::from_utf8_lossy(&text)))
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            if has_md && has_meta && broken.is_empty() {
                complete_count += 1;
            } else {
                issues.push(ItemIssue {
                    kind: kind.clone(),
                    id: *id,
                    missing_md: !has_md,
                    missing_meta: !has_meta,
                    broken_images: broken.into_iter().take(MAX_BROKEN_PER_ITEM).collect(),
                });
            }
        }

        ItemsCheck {
            ok: issues.is_empty(),
            total_expected: expected.len(),
            complete_count,
            incomplete_count: issues.len(),
            issues: detail.then_some(issues),
        }
    }

    /// Distinct `(type, id)` pairs across every readable listing
    fn expected_items(&self) -> BTreeSet<(String, i64)> {
        let mut expected = BTreeSet::new();
        for listing in list_files(&self.store.config().months_dir(), ".json") {
            let Ok(serde_json::Value::Array(entries)) = read_json(&listing) else {
                continue;
            };
            for entry in entries {
                if let (Some(kind), Some(id)) = (
                    entry.get("type").and_then(|t| t.as_str()),
                    entry.get("id").and_then(|i| i.as_i64()),
                ) {
                    expected.insert((kind.to_string(), id));
                }
            }
        }
        expected
    }

    /// Image file names referenced as `./images/...` that are not cached
    fn broken_images(&self, text: &str) -> Vec<String> {
        let images_dir = self.store.images_dir();
        self.pattern
            .captures_iter(text)
            .filter_map(|c| c.get(2).map(|m| m.as_str()))
            .filter(|url| url.starts_with(LOCAL_IMAGE_PREFIX))
            .filter_map(|url| url.rsplit('/').next())
            .filter(|name| !images_dir.join(name).exists())
            .map(String::from)
            .collect()
    }
}

fn read_json(path: &Path) -> std::result::Result<serde_json::Value, String> {
    let raw = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&raw).map_err(|e| e.to_string())
}

/// Files in `dir` whose name ends with `suffix`, sorted; a missing dir is empty
fn list_files(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix))
        })
        .collect();
    files.sort();
    files
}

fn stem(path: &Path, suffix: &str) -> Option<String> {
    path.file_name()?
        .to_str()?
        .strip_suffix(suffix)
        .map(String::from)
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
