//! Core data types for extracted posts and extraction results.

use serde::{Deserialize, Deserializer, Serialize};

use crate::timestamp::{is_short_date, UNKNOWN_TIMESTAMP};

/// A single post recovered from a profile feed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub content: String,
    #[serde(
        default = "unknown_timestamp",
        alias = "datetime",
        deserialize_with = "timestamp_field"
    )]
    pub timestamp: String,
    /// Older post files carry a single `image` string instead.
    #[serde(default, alias = "image", deserialize_with = "images_field")]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
}

fn unknown_timestamp() -> String {
    UNKNOWN_TIMESTAMP.to_string()
}

fn timestamp_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|ts| ts.trim().to_string())
        .filter(|ts| !ts.is_empty())
        .unwrap_or_else(unknown_timestamp))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImagesField {
    One(String),
    Many(Vec<String>),
}

fn images_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    let images = match Option::<ImagesField>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ImagesField::One(url)) => vec![url],
        Some(ImagesField::Many(urls)) => urls,
    };
    let images: Vec<String> = images.into_iter().filter(|u| !u.trim().is_empty()).collect();
    Ok(if images.is_empty() { None } else { Some(images) })
}

impl Post {
    /// Create a post with no id, images or engagement counters.
    pub fn new(
        user: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user: user.into(),
            content: content.into(),
            timestamp: timestamp.into(),
            images: None,
            likes: 0,
            comments: 0,
        }
    }

    /// Attach an explicit identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach image URLs; an empty list is stored as `None`.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = if images.is_empty() { None } else { Some(images) };
        self
    }

    /// Whether the post passes the acceptance guard: non-empty user and
    /// content, and content that is neither the username nor a bare date.
    pub fn is_acceptable(&self) -> bool {
        let user = self.user.trim();
        let content = self.content.trim();
        !user.is_empty()
            && !content.is_empty()
            && content.trim_start_matches('@') != user.trim_start_matches('@')
            && !is_short_date(content)
    }

    /// Whether the timestamp carries a real value rather than the
    /// `unknown` marker.
    pub fn has_known_timestamp(&self) -> bool {
        let ts = self.timestamp.trim();
        !ts.is_empty() && ts != UNKNOWN_TIMESTAMP
    }

    /// Number of retained images.
    pub fn image_count(&self) -> usize {
        self.images.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Optional per-call hints supplied by the acquisition side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractHints {
    /// Known avatar URL of the page owner.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Handle of the page owner, preferred over the handle found in markup.
    #[serde(default)]
    pub profile_handle: Option<String>,
}

impl ExtractHints {
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn with_profile_handle(mut self, handle: impl Into<String>) -> Self {
        self.profile_handle = Some(handle.into());
        self
    }
}

/// Which extraction path produced the posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Payload,
    Dom,
    /// Neither path produced a post.
    None,
}

/// Counters describing what an extraction call saw and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStats {
    pub payload_blocks: usize,
    pub malformed_blocks: usize,
    pub payload_items: usize,
    pub replies_skipped: usize,
    pub empty_captions: usize,
    pub payload_rejected: usize,
    pub dom_candidates: usize,
    pub dom_rejected: usize,
    pub duplicates_removed: usize,
}

/// Result of a single extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub posts: Vec<Post>,
    pub source: ExtractionSource,
    pub stats: ExtractStats,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Errors raised by configuration loading and collaborator plumbing.
/// Extraction itself never fails.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptance_guard() {
        assert!(Post::new("alice", "hello there", "unknown").is_acceptable());
        assert!(!Post::new("", "hello there", "unknown").is_acceptable());
        assert!(!Post::new("alice", "   ", "unknown").is_acceptable());
        assert!(!Post::new("alice", "alice", "unknown").is_acceptable());
        assert!(!Post::new("alice", "@alice", "unknown").is_acceptable());
        assert!(!Post::new("alice", "16/06/25", "unknown").is_acceptable());
    }

    #[test]
    fn test_with_images_empty_is_none() {
        let post = Post::new("a", "b", "unknown").with_images(Vec::new());
        assert!(post.images.is_none());
        assert_eq!(post.image_count(), 0);
    }

    #[test]
    fn test_serde_shape() {
        let post = Post::new("alice", "hi", "2024-03-09T16:00:00Z");
        let json = serde_json::to_value(&post).unwrap();
        assert!(json.get("id").is_none());
        assert!(json["images"].is_null());
        assert_eq!(json["likes"], 0);

        let back: Post =
            serde_json::from_str(r#"{"user":"bob","content":"x"}"#).unwrap();
        assert_eq!(back.timestamp, "unknown");
        assert!(!back.has_known_timestamp());
    }

    #[test]
    fn test_reads_legacy_post_file_shape() {
        let legacy: Vec<Post> = serde_json::from_str(
            r#"[
                {"user": "j.p_morgan_trading", "content": "Gold buy", "datetime": "2025-06-16T08:55:01.000Z", "image": "https://cdn.x/chart.jpg"},
                {"user": "j.p_morgan_trading", "content": "No media", "datetime": null, "image": null},
                {"user": "j.p_morgan_trading", "content": "Blank", "datetime": "", "image": ""}
            ]"#,
        )
        .unwrap();
        assert_eq!(legacy[0].timestamp, "2025-06-16T08:55:01.000Z");
        assert_eq!(legacy[0].images, Some(vec!["https://cdn.x/chart.jpg".to_string()]));
        assert_eq!(legacy[1].timestamp, "unknown");
        assert!(legacy[1].images.is_none());
        assert_eq!(legacy[2].timestamp, "unknown");
        assert!(legacy[2].images.is_none());

        let current: Post = serde_json::from_str(
            r#"{"user": "u", "content": "c", "timestamp": "2024-03-09T16:00:00Z", "images": ["a", "b"]}"#,
        )
        .unwrap();
        assert_eq!(current.image_count(), 2);
        let again: Post = serde_json::from_value(serde_json::to_value(&current).unwrap()).unwrap();
        assert_eq!(again, current);
    }
}
