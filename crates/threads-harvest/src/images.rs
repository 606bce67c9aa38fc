//! Post image vs chrome image classification.
//!
//! Feed rows repeat the author's avatar next to every post, sprinkle small
//! icons around the engagement bar, and only sometimes carry a real post
//! image. The classifier applies ordered rules to each candidate; the first
//! rule that fires decides.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use scraper::{Html, Selector};

use crate::config::ExtractConfig;
use crate::types::ExtractHints;

/// Strip query string and fragment so resized variants compare equal.
pub fn base_url(url: &str) -> &str {
    url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url)
}

/// Surroundings of an image in the DOM.
#[derive(Debug, Clone, Default)]
pub struct AncestryHints {
    /// Lowercased class, id and role values of the nearest ancestors.
    pub tokens: Vec<String>,
    /// An ancestor is a link to a profile page.
    pub in_profile_link: bool,
}

/// An image reference found near a post.
#[derive(Debug, Clone, Default)]
pub struct ImageCandidate {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Index among the images of the same post container.
    pub position: usize,
    pub in_media_link: bool,
    pub ancestry: AncestryHints,
}

impl ImageCandidate {
    pub fn new(url: Option<String>, position: usize) -> Self {
        Self {
            url: url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            position,
            ..Default::default()
        }
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn in_media_link(mut self, yes: bool) -> Self {
        self.in_media_link = yes;
        self
    }

    pub fn with_ancestry(mut self, ancestry: AncestryHints) -> Self {
        self.ancestry = ancestry;
        self
    }
}

/// Why an image was treated as chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeReason {
    MissingUrl,
    KnownAvatar,
    RepeatedImage,
    LeadingAvatar,
    ChromeAncestry,
    Icon,
}

/// Classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    Content,
    Chrome(ChromeReason),
}

impl ImageClass {
    pub fn is_content(self) -> bool {
        matches!(self, ImageClass::Content)
    }
}

/// Document-level knowledge used to recognize chrome.
#[derive(Debug, Clone, Default)]
pub struct ChromeContext {
    /// Base URLs of known avatars.
    pub avatar_bases: HashSet<String>,
    /// Base URL of the most repeated image in the session, if repeated
    /// often enough to be the avatar.
    pub most_frequent: Option<String>,
    /// Base URLs that look like avatars when they lead a container.
    pub avatar_candidates: HashSet<String>,
}

impl ChromeContext {
    /// Build the context from caller hints and the session frequency table.
    pub fn new(hints: &ExtractHints, frequency: &ImageFrequency, config: &ExtractConfig) -> Self {
        let mut ctx = Self {
            most_frequent: frequency
                .most_frequent(config.min_avatar_repeats)
                .map(str::to_string),
            ..Default::default()
        };
        if let Some(avatar) = hints.avatar_url.as_deref() {
            ctx.add_avatar(avatar);
        }
        ctx
    }

    pub fn add_avatar(&mut self, url: &str) {
        let base = base_url(url.trim());
        if !base.is_empty() {
            self.avatar_bases.insert(base.to_string());
        }
    }

    pub fn add_avatar_candidate(&mut self, url: &str) {
        let base = base_url(url.trim());
        if !base.is_empty() {
            self.avatar_candidates.insert(base.to_string());
        }
    }
}

/// Classify one image candidate.
pub fn classify(candidate: &ImageCandidate, ctx: &ChromeContext, config: &ExtractConfig) -> ImageClass {
    let url = match candidate.url.as_deref() {
        Some(url) => url,
        None => return ImageClass::Chrome(ChromeReason::MissingUrl),
    };
    let base = base_url(url);

    if ctx.avatar_bases.contains(base) {
        return ImageClass::Chrome(ChromeReason::KnownAvatar);
    }
    if ctx.most_frequent.as_deref() == Some(base) {
        return ImageClass::Chrome(ChromeReason::RepeatedImage);
    }
    if candidate.position == 0 && ctx.avatar_candidates.contains(base) {
        return ImageClass::Chrome(ChromeReason::LeadingAvatar);
    }
    if candidate.ancestry.in_profile_link || has_chrome_token(&candidate.ancestry, config) {
        return ImageClass::Chrome(ChromeReason::ChromeAncestry);
    }
    if is_icon_sized(candidate, config.icon_size_threshold) {
        return ImageClass::Chrome(ChromeReason::Icon);
    }
    ImageClass::Content
}

fn has_chrome_token(ancestry: &AncestryHints, config: &ExtractConfig) -> bool {
    ancestry.tokens.iter().any(|token| {
        config
            .chrome_tokens
            .iter()
            .any(|hint| !hint.is_empty() && token.contains(hint.as_str()))
    })
}

fn is_icon_sized(candidate: &ImageCandidate, threshold: u32) -> bool {
    let declared: Vec<u32> = [candidate.width, candidate.height]
        .into_iter()
        .flatten()
        .filter(|d| *d > 0)
        .collect();
    !declared.is_empty() && declared.iter().all(|d| *d < threshold)
}

/// Keep the post-content images of one container.
///
/// Duplicate base URLs collapse to the first occurrence; media-link images
/// are ordered ahead of bare ones.
pub fn select_images(
    candidates: &[ImageCandidate],
    ctx: &ChromeContext,
    config: &ExtractConfig,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut media = Vec::new();
    let mut bare = Vec::new();

    for candidate in candidates {
        match classify(candidate, ctx, config) {
            ImageClass::Content => {
                let Some(url) = candidate.url.as_deref() else {
                    continue;
                };
                if !seen.insert(base_url(url).to_string()) {
                    continue;
                }
                if candidate.in_media_link {
                    media.push(url.to_string());
                } else {
                    bare.push(url.to_string());
                }
            }
            ImageClass::Chrome(reason) => {
                tracing::trace!(
                    url = candidate.url.as_deref().unwrap_or(""),
                    ?reason,
                    "skipping chrome image"
                );
            }
        }
    }

    media.extend(bare);
    if let Some(max) = config.max_images_per_post {
        media.truncate(max);
    }
    media
}

pub(crate) fn img_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("img").expect("img selector is valid"))
}

/// Resolve the URL of an `<img>`, preferring `src` over `data-src`.
pub fn img_url(element: &scraper::node::Element) -> Option<&str> {
    element
        .attr("src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| element.attr("data-src").filter(|s| !s.trim().is_empty()))
}

/// Image base-URL counts accumulated across scroll passes of one session.
///
/// The avatar shows up once per feed row, so after a few rows it is the
/// most repeated image on the page even when nothing else identifies it.
#[derive(Debug, Clone, Default)]
pub struct ImageFrequency {
    counts: HashMap<String, usize>,
    first_seen: Vec<String>,
}

impl ImageFrequency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of an image URL.
    pub fn record(&mut self, url: &str) {
        let base = base_url(url.trim());
        if base.is_empty() {
            return;
        }
        match self.counts.get_mut(base) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(base.to_string(), 1);
                self.first_seen.push(base.to_string());
            }
        }
    }

    /// Count every `<img>` in a parsed document.
    pub fn observe_document(&mut self, document: &Html) {
        for img in document.select(img_selector()) {
            if let Some(url) = img_url(img.value()) {
                self.record(url);
            }
        }
    }

    pub fn count(&self, url: &str) -> usize {
        self.counts.get(base_url(url.trim())).copied().unwrap_or(0)
    }

    /// Most repeated base URL with at least `min_repeats` occurrences.
    /// Ties go to the URL seen first.
    pub fn most_frequent(&self, min_repeats: usize) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for base in &self.first_seen {
            let count = self.counts.get(base).copied().unwrap_or(0);
            if count < min_repeats.max(1) {
                continue;
            }
            if best.map(|(_, c)| count > c).unwrap_or(true) {
                best = Some((base.as_str(), count));
            }
        }
        best.map(|(base, _)| base)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
