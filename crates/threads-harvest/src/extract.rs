//! Extraction engine: payload first, DOM heuristics as fallback.

use scraper::{Html, Selector};

use crate::config::{parse_selector, ExtractConfig};
use crate::dedup::{dedup, SeenKeys};
use crate::dom::extract_dom_posts;
use crate::images::{ChromeContext, ImageFrequency};
use crate::payload::extract_payload_posts;
use crate::profile::resolve_profile_username;
use crate::types::{ExtractHints, ExtractStats, Extraction, ExtractionSource, HarvestResult, Post};

/// Post extractor bound to one validated configuration.
///
/// Immutable after construction; share it freely across sessions.
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractConfig,
    payload_selector: Selector,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> HarvestResult<Self> {
        config.validate()?;
        let payload_selector = parse_selector(&config.payload_selector)?;
        Ok(Self {
            config,
            payload_selector,
        })
    }

    /// Extractor with the built-in defaults.
    pub fn with_defaults() -> HarvestResult<Self> {
        Self::new(ExtractConfig::default())
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Extract posts from one document without session state. Image
    /// repeats are counted over this document alone.
    pub fn extract(&self, html: &str, hints: &ExtractHints) -> Extraction {
        self.extract_with(html, hints, &ImageFrequency::default())
    }

    /// Extract posts using image counts accumulated by earlier passes plus
    /// the counts of this document. `frequency` itself is left unchanged.
    pub fn extract_with(&self, html: &str, hints: &ExtractHints, frequency: &ImageFrequency) -> Extraction {
        let document = Html::parse_document(html);
        let mut frequency = frequency.clone();
        frequency.observe_document(&document);
        self.extract_document(&document, hints, &frequency)
    }

    /// `frequency` must already include the images of `document`.
    fn extract_document(
        &self,
        document: &Html,
        hints: &ExtractHints,
        frequency: &ImageFrequency,
    ) -> Extraction {
        let config = &self.config;
        let mut stats = ExtractStats::default();
        let ctx = ChromeContext::new(hints, frequency, config);

        let fallback_user = hints
            .profile_handle
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('@').to_string())
            .or_else(|| resolve_profile_username(document));
        let fallback_user = fallback_user.as_deref();

        let mut source = ExtractionSource::Payload;
        let mut posts = extract_payload_posts(
            document,
            &self.payload_selector,
            &ctx,
            fallback_user,
            config,
            &mut stats,
        );
        if posts.is_empty() {
            source = ExtractionSource::Dom;
            posts = extract_dom_posts(document, &ctx, fallback_user, config, &mut stats);
        }
        if posts.is_empty() {
            source = ExtractionSource::None;
        }

        let before = posts.len();
        let posts: Vec<Post> = dedup(posts);
        stats.duplicates_removed = before - posts.len();

        tracing::info!(
            source = ?source,
            posts = posts.len(),
            payload_blocks = stats.payload_blocks,
            payload_items = stats.payload_items,
            replies_skipped = stats.replies_skipped,
            dom_candidates = stats.dom_candidates,
            duplicates_removed = stats.duplicates_removed,
            "extraction finished"
        );
        if posts.is_empty() && has_body_content(document) {
            tracing::warn!("no posts found in a non-empty document");
        }

        Extraction {
            posts,
            source,
            stats,
        }
    }
}

fn has_body_content(document: &Html) -> bool {
    document
        .root_element()
        .text()
        .any(|text| !text.trim().is_empty())
}

/// State carried across scroll passes over the same page.
#[derive(Debug, Clone, Default)]
pub struct ScrollSession {
    pub frequency: ImageFrequency,
    pub seen: SeenKeys,
}

impl ScrollSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one pass and return only the posts this session has not yet
    /// emitted.
    pub fn ingest(&mut self, extractor: &Extractor, html: &str, hints: &ExtractHints) -> Vec<Post> {
        let document = Html::parse_document(html);
        self.frequency.observe_document(&document);
        let extraction = extractor.extract_document(&document, hints, &self.frequency);
        let fresh = self.seen.retain_unseen(extraction.posts);
        tracing::debug!(
            new_posts = fresh.len(),
            seen_total = self.seen.len(),
            "scroll pass ingested"
        );
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryMarker;
    use crate::types::HarvestError;

    fn row(id: &str, caption: &str, avatar: &str) -> String {
        format!(
            r#"<div data-pressable-container="true">
              <a href="/@trader"><span>trader</span></a>
              <div class="x9f"><img src="{avatar}" width="80" height="80"></div>
              <a href="/@trader/post/{id}"><time datetime="2025-06-16T08:{id}:00.000Z">1h</time></a>
              <span>{caption}</span>
            </div>"#
        )
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ExtractConfig {
            ancestor_ceiling: 0,
            ..Default::default()
        };
        assert!(matches!(Extractor::new(config), Err(HarvestError::Config(_))));

        let config = ExtractConfig {
            payload_selector: "script[".to_string(),
            ..Default::default()
        };
        assert!(Extractor::new(config).is_err());
    }

    #[test]
    fn test_payload_wins_over_dom() {
        let html = format!(
            r#"<html><body>
            <script type="application/json">{{"thread_items":[{{"post":{{"pk":"9","user":{{"username":"json_user"}},"caption":{{"text":"from payload"}}}}}}]}}</script>
            {}
            </body></html>"#,
            row("10", "from markup", "https://cdn.x/a.jpg")
        );
        let extractor = Extractor::with_defaults().unwrap();
        let out = extractor.extract(&html, &ExtractHints::default());
        assert_eq!(out.source, ExtractionSource::Payload);
        assert_eq!(out.posts.len(), 1);
        assert_eq!(out.posts[0].content, "from payload");
    }

    #[test]
    fn test_empty_document_yields_none() {
        let extractor = Extractor::with_defaults().unwrap();
        let out = extractor.extract("", &ExtractHints::default());
        assert!(out.is_empty());
        assert_eq!(out.source, ExtractionSource::None);
    }

    #[test]
    fn test_hint_handle_beats_markup() {
        let html = r#"<html><body><div role="article">
          <a href="/@x/post/P1"><time datetime="t">1h</time></a>
          <span>caption without an author link</span>
        </div><a href="/@markup_owner">markup_owner</a></body></html>"#;
        let extractor = Extractor::with_defaults().unwrap();

        let out = extractor.extract(html, &ExtractHints::default());
        assert_eq!(out.posts[0].user, "markup_owner");

        let hints = ExtractHints::default().with_profile_handle("@hinted");
        let out = extractor.extract(html, &hints);
        assert_eq!(out.posts[0].user, "hinted");
    }

    #[test]
    fn test_session_learns_avatar_and_skips_seen() {
        let avatar = "https://cdn.x/avatar.jpg";
        let first = format!(
            "<html><body>{}{}</body></html>",
            row("01", "first caption here", &format!("{avatar}?s=1")),
            row("02", "second caption here", &format!("{avatar}?s=2"))
        );
        let second = format!(
            "<html><body>{}{}</body></html>",
            row("02", "second caption here", &format!("{avatar}?s=2")),
            row("03", "third caption here", &format!("{avatar}?s=3"))
        );

        let extractor = Extractor::new(ExtractConfig {
            post_boundary_markers: vec![BoundaryMarker::any("data-pressable-container")],
            ..Default::default()
        })
        .unwrap();

        let stateless = extractor.extract(&first, &ExtractHints::default());
        assert_eq!(stateless.posts.len(), 2);
        assert!(stateless.posts.iter().all(|p| p.images.is_none()));

        let lone = format!(
            "<html><body>{}</body></html>",
            row("04", "fourth caption here", &format!("{avatar}?s=4"))
        );
        let stateless = extractor.extract(&lone, &ExtractHints::default());
        assert_eq!(stateless.posts[0].image_count(), 1);

        let mut session = ScrollSession::new();
        let pass1 = session.ingest(&extractor, &first, &ExtractHints::default());
        assert_eq!(pass1.len(), 2);
        assert!(pass1.iter().all(|p| p.images.is_none()));

        let pass2 = session.ingest(&extractor, &second, &ExtractHints::default());
        assert_eq!(pass2.len(), 1);
        assert_eq!(pass2[0].id.as_deref(), Some("03"));
        assert_eq!(session.frequency.count(avatar), 4);

        let pass3 = session.ingest(&extractor, &lone, &ExtractHints::default());
        assert_eq!(pass3.len(), 1);
        assert!(pass3[0].images.is_none());
        assert_eq!(session.frequency.count(avatar), 5);
    }

    #[test]
    fn test_extract_with_counts_document_without_mutating_table() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            row("05", "fifth caption here", "https://cdn.x/rep.jpg?a=1"),
            row("06", "sixth caption here", "https://cdn.x/rep.jpg?a=2")
        );
        let extractor = Extractor::with_defaults().unwrap();
        let table = ImageFrequency::new();
        let out = extractor.extract_with(&html, &ExtractHints::default(), &table);
        assert!(out.posts.iter().all(|p| p.images.is_none()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_extractor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Extractor>();
    }
}
