//! Extraction policies and thresholds, with file/env loading.
//!
//! Every heuristic in the engine reads its knobs from [`ExtractConfig`].
//! The defaults are tuned against captured feed pages; a JSON file with any
//! subset of the fields overrides them.

use std::path::{Path, PathBuf};

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "THREADS_HARVEST_CONFIG";

/// Config file looked up relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = ".threads-harvest/config.json";

/// How the DOM path picks the caption among qualifying spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPolicy {
    /// Longest qualifying text; ties go to the first encountered.
    #[default]
    Longest,
    /// First qualifying text in document order.
    First,
}

/// An attribute that marks an element as the outer box of a single post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryMarker {
    pub attribute: String,
    /// Required value; `None` matches any value, including empty.
    #[serde(default)]
    pub value: Option<String>,
}

impl BoundaryMarker {
    pub fn any(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: None,
        }
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: Some(value.into()),
        }
    }

    /// Check an element's value for this marker's attribute.
    pub fn matches(&self, attr_value: Option<&str>) -> bool {
        match (attr_value, &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual.eq_ignore_ascii_case(expected),
        }
    }
}

/// Tunable extraction policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// CSS selector for embedded JSON script blocks.
    pub payload_selector: String,
    /// Keys under which the payload stores its post list.
    pub thread_item_keys: Vec<String>,
    /// Drop payload entries that reference a parent post.
    pub skip_replies: bool,
    /// Keys whose non-empty value marks a payload entry as a reply.
    pub reply_keys: Vec<String>,
    /// Maximum number of ancestors climbed from a permalink to its container.
    pub ancestor_ceiling: usize,
    pub post_boundary_markers: Vec<BoundaryMarker>,
    pub content_policy: ContentPolicy,
    /// Class/id/role substrings that mark an image's surroundings as chrome.
    pub chrome_tokens: Vec<String>,
    /// How many ancestors of an image are checked for chrome tokens.
    pub chrome_ancestry_depth: usize,
    /// Images whose declared dimensions are all below this are icons.
    pub icon_size_threshold: u32,
    /// Minimum repeat count before the most frequent image is treated as
    /// the avatar.
    pub min_avatar_repeats: usize,
    /// Substring of a link target that marks it as a media viewer link.
    pub media_link_marker: String,
    pub max_images_per_post: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            payload_selector: r#"script[type="application/json"]"#.to_string(),
            thread_item_keys: vec![
                "thread_items".to_string(),
                "threadItems".to_string(),
                "posts".to_string(),
            ],
            skip_replies: true,
            reply_keys: vec![
                "parent_post_id".to_string(),
                "replied_to_post_id".to_string(),
                "reply_to_author".to_string(),
            ],
            ancestor_ceiling: 10,
            post_boundary_markers: vec![
                BoundaryMarker::any("data-pressable-container"),
                BoundaryMarker::equals("role", "article"),
            ],
            content_policy: ContentPolicy::Longest,
            chrome_tokens: vec![
                "header".to_string(),
                "profile".to_string(),
                "user".to_string(),
                "avatar".to_string(),
            ],
            chrome_ancestry_depth: 2,
            icon_size_threshold: 48,
            min_avatar_repeats: 2,
            media_link_marker: "/media".to_string(),
            max_images_per_post: None,
        }
    }
}

impl ExtractConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> HarvestResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config from the resolved path, or the defaults when no
    /// config file is configured.
    pub fn load(explicit: Option<&str>) -> HarvestResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::debug!("loading extraction config from {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.ancestor_ceiling == 0 {
            return Err(HarvestError::Config(
                "ancestor_ceiling must be at least 1".to_string(),
            ));
        }
        if self.thread_item_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(HarvestError::Config(
                "thread_item_keys must name at least one key".to_string(),
            ));
        }
        if self.max_images_per_post == Some(0) {
            return Err(HarvestError::Config(
                "max_images_per_post must be positive when set".to_string(),
            ));
        }
        parse_selector(&self.payload_selector)?;
        Ok(())
    }
}

/// Parse a CSS selector, mapping failures into [`HarvestError::Selector`].
pub(crate) fn parse_selector(selector: &str) -> HarvestResult<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Resolve the config file path.
///
/// Order: explicit path, then `THREADS_HARVEST_CONFIG`, then
/// `.threads-harvest/config.json` if it exists. `None` means defaults.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if !env_path.trim().is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_PATH);
    if local.exists() {
        return Some(local);
    }

    None
}
