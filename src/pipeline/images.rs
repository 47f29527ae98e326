//! Embedded image extraction, caching and link rewriting
//!
//! Image references look like `![alt](url)`. Every remote reference is
//! cached under a content-addressed file name and the link is rewritten to
//! `./images/{file}`. A failed image never fails the item that contains it.

use crate::error::{Error, Result};
use crate::source::FetchSource;
use crate::types::ImageOutcome;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

const IMAGE_REF_PATTERN: &str = r"!\[([^\]]*)\]\(([^)]+)\)";

const IMAGE_EXTENSIONS: [&str; 7] = [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg"];

const DEFAULT_EXTENSION: &str = ".png";

/// Relative prefix of rewritten image links
pub const LOCAL_IMAGE_PREFIX: &str = "./images/";

/// Downloads referenced images and rewrites bodies to point at local copies
#[derive(Clone)]
pub struct ImagePipeline {
    source: Arc<dyn FetchSource>,
    images_dir: PathBuf,
    pattern: Regex,
}

impl ImagePipeline {
    /// Cache images under `images_dir`
    pub fn new(source: Arc<dyn FetchSource>, images_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            source,
            images_dir,
            pattern: image_ref_regex()?,
        })
    }

    /// Rewrite every remote image reference in `body` that could be cached
    pub async fn process(&self, body: &str) -> (String, Vec<ImageOutcome>) {
        if body.is_empty() {
            return (String::new(), Vec::new());
        }

        let references: Vec<(String, String)> = self
            .pattern
            .captures_iter(body)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();

        let mut rewritten = body.to_string();
        let mut outcomes = Vec::new();
        // Download result per canonical URL within this body
        let mut attempted: HashMap<String, bool> = HashMap::new();

        for (alt, url) in references {
            let Some(canonical) = canonical_image_url(&url) else {
                continue;
            };
            let file_name = cache_file_name(&canonical);
            let dest = self.images_dir.join(&file_name);

            let (cached, success) = match attempted.get(&canonical) {
                Some(&downloaded) => (downloaded, downloaded),
                None => {
                    let cached = tokio::fs::try_exists(&dest).await.unwrap_or(false);
                    let success = if cached {
                        debug!(url = %url, file = %file_name, "Image already cached");
                        true
                    } else {
                        self.source.download_file(&url, &dest).await
                    };
                    attempted.insert(canonical, success);
                    (cached, success)
                }
            };

            if success {
                let from = format!("![{alt}]({url})");
                let to = format!("![{alt}]({LOCAL_IMAGE_PREFIX}{file_name})");
                rewritten = rewritten.replace(&from, &to);
            } else {
                warn!(url = %url, "Image download failed, keeping remote link");
            }

            outcomes.push(ImageOutcome {
                url,
                file_name: success.then_some(file_name),
                cached,
                success,
            });
        }

        (rewritten, outcomes)
    }
}

/// Compile the `![alt](url)` matcher
pub(crate) fn image_ref_regex() -> Result<Regex> {
    Regex::new(IMAGE_REF_PATTERN)
        .map_err(|e| Error::Other(format!("invalid image reference pattern: {}", e)))
}

/// The reference URL without its query string, or `None` for non-remote references
pub fn canonical_image_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let (before_fragment, fragment) = match url.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (url, None),
    };
    let without_query = before_fragment
        .split_once('?')
        .map_or(before_fragment, |(head, _)| head);

    Some(match fragment {
        Some(frag) => format!("{without_query}#{frag}"),
        None => without_query.to_string(),
    })
}

/// Content-addressed cache file name: `md5(canonical) + extension`
pub fn cache_file_name(canonical_url: &str) -> String {
    format!(
        "{:x}{}",
        md5::compute(canonical_url.as_bytes()),
        image_extension(canonical_url)
    )
}

/// Extension inferred from the URL path, restricted to known image types
pub fn image_extension(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();

    let suffix = match file.rfind('.') {
        Some(idx) if idx > 0 => file[idx..].to_ascii_lowercase(),
        _ => return DEFAULT_EXTENSION,
    };
    if suffix.len() < 3 {
        return DEFAULT_EXTENSION;
    }

    IMAGE_EXTENSIONS
        .iter()
        .find(|ext| **ext == suffix)
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}
