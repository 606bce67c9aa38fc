//! Deduplication, merging and newest-first ordering of post lists.

use std::collections::HashSet;

use crate::timestamp::sort_key;
use crate::types::Post;

/// Identity of a post for dedup purposes.
///
/// An explicit id is authoritative; without one the post is identified by
/// author, timestamp and content together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Id(String),
    Composite {
        user: String,
        timestamp: String,
        content: String,
    },
}

pub fn dedup_key(post: &Post) -> DedupKey {
    match post.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => DedupKey::Id(id.to_string()),
        None => DedupKey::Composite {
            user: post.user.clone(),
            timestamp: post.timestamp.clone(),
            content: post.content.clone(),
        },
    }
}

/// Drop repeated posts; the first occurrence wins and order is preserved.
pub fn dedup(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert(dedup_key(post)))
        .collect()
}

/// Union of a fresh scrape and stored posts. Fresh copies win.
pub fn merge(fresh: Vec<Post>, stored: Vec<Post>) -> Vec<Post> {
    let mut all = fresh;
    all.extend(stored);
    dedup(all)
}

/// Stable sort, newest first. Unknown timestamps sort as the oldest.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| sort_key(&b.timestamp).cmp(&sort_key(&a.timestamp)));
}

pub fn merge_sorted(fresh: Vec<Post>, stored: Vec<Post>) -> Vec<Post> {
    let mut merged = merge(fresh, stored);
    sort_newest_first(&mut merged);
    merged
}

/// Keys already emitted by earlier scroll passes of one session.
#[derive(Debug, Clone, Default)]
pub struct SeenKeys {
    keys: HashSet<DedupKey>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a post; returns `false` if it was already seen.
    pub fn insert(&mut self, post: &Post) -> bool {
        self.keys.insert(dedup_key(post))
    }

    pub fn contains(&self, post: &Post) -> bool {
        self.keys.contains(&dedup_key(post))
    }

    /// Keep only posts not seen before, recording them as seen.
    pub fn retain_unseen(&mut self, posts: Vec<Post>) -> Vec<Post> {
        posts.into_iter().filter(|post| self.insert(post)).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
