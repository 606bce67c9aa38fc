//! Persistence and run-status collaborators, and the harvest pipeline that
//! ties them to the extractor.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::{dedup_key, merge_sorted, DedupKey};
use crate::extract::Extractor;
use crate::types::{ExtractHints, ExtractionSource, HarvestResult, Post};

/// Storage for the accumulated post list.
pub trait PostStore {
    fn existing_posts(&self) -> HarvestResult<Vec<Post>>;
    /// Replace the stored list wholesale.
    fn replace_posts(&mut self, posts: Vec<Post>) -> HarvestResult<()>;
}

/// Receives one signal per run: whether extraction produced anything.
pub trait RunStatusSink {
    fn record(&mut self, extracted: bool) -> HarvestResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPostStore {
    posts: Vec<Post>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }
}

impl PostStore for MemoryPostStore {
    fn existing_posts(&self) -> HarvestResult<Vec<Post>> {
        Ok(self.posts.clone())
    }

    fn replace_posts(&mut self, posts: Vec<Post>) -> HarvestResult<()> {
        self.posts = posts;
        Ok(())
    }
}

/// Post list kept as a pretty-printed JSON array on disk.
///
/// A missing file reads as an empty list. A file that does not parse is an
/// error rather than an empty list, so a bad file is never overwritten.
#[derive(Debug, Clone)]
pub struct JsonFilePostStore {
    path: PathBuf,
}

impl JsonFilePostStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PostStore for JsonFilePostStore {
    fn existing_posts(&self) -> HarvestResult<Vec<Post>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn replace_posts(&mut self, posts: Vec<Post>) -> HarvestResult<()> {
        write_json(&self.path, &posts)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> HarvestResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Run-status sink that keeps every signal in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRunStatus {
    pub records: Vec<bool>,
}

impl MemoryRunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<bool> {
        self.records.last().copied()
    }
}

impl RunStatusSink for MemoryRunStatus {
    fn record(&mut self, extracted: bool) -> HarvestResult<()> {
        self.records.push(extracted);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Working,
    Stopped,
}

/// One stretch of time during which an extraction method kept working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPeriod {
    pub method: String,
    pub status: RunState,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Run-status sink that tracks working periods of a method in a JSON file.
///
/// A successful run opens a period unless one is already open; a failed run
/// closes the open period.
#[derive(Debug, Clone)]
pub struct JsonRunHistory {
    path: PathBuf,
    method: String,
}

impl JsonRunHistory {
    pub fn new(path: impl Into<PathBuf>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
        }
    }

    pub fn periods(&self) -> HarvestResult<Vec<RunPeriod>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn record_at(&mut self, extracted: bool, now: DateTime<Utc>) -> HarvestResult<()> {
        let mut periods = self.periods()?;
        let open = periods
            .iter_mut()
            .find(|p| p.method == self.method && p.status == RunState::Working && p.end.is_none());

        match (extracted, open) {
            (true, Some(_)) | (false, None) => return Ok(()),
            (true, None) => periods.push(RunPeriod {
                method: self.method.clone(),
                status: RunState::Working,
                start: now,
                end: None,
            }),
            (false, Some(period)) => {
                period.status = RunState::Stopped;
                period.end = Some(now);
            }
        }
        tracing::debug!(method = %self.method, extracted, "run status changed");
        write_json(&self.path, &periods)
    }
}

impl RunStatusSink for JsonRunHistory {
    fn record(&mut self, extracted: bool) -> HarvestResult<()> {
        self.record_at(extracted, Utc::now())
    }
}

/// Outcome of one harvest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestReport {
    pub source: ExtractionSource,
    /// Posts produced by extraction.
    pub extracted: usize,
    /// Extracted posts that were not already stored.
    pub new_posts: usize,
    /// Size of the stored list after the merge.
    pub total: usize,
}

/// Extract one document, signal run status, merge with the stored posts
/// and persist the result newest first.
///
/// An empty extraction still records a failed run but leaves the store
/// untouched.
pub fn harvest<S, R>(
    extractor: &Extractor,
    html: &str,
    hints: &ExtractHints,
    store: &mut S,
    status: &mut R,
) -> HarvestResult<HarvestReport>
where
    S: PostStore + ?Sized,
    R: RunStatusSink + ?Sized,
{
    let extraction = extractor.extract(html, hints);
    let extracted = extraction.posts.len();
    status.record(extracted > 0)?;

    let stored = store.existing_posts()?;
    if extracted == 0 {
        return Ok(HarvestReport {
            source: extraction.source,
            extracted,
            new_posts: 0,
            total: stored.len(),
        });
    }

    let stored_keys: HashSet<DedupKey> = stored.iter().map(dedup_key).collect();
    let new_posts = extraction
        .posts
        .iter()
        .filter(|post| !stored_keys.contains(&dedup_key(post)))
        .count();
    let merged = merge_sorted(extraction.posts, stored);
    let total = merged.len();
    store.replace_posts(merged)?;

    tracing::info!(extracted, new_posts, total, "harvest stored");
    Ok(HarvestReport {
        source: extraction.source,
        extracted,
        new_posts,
        total,
    })
}
