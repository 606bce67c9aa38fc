//! Heuristic post extraction from rendered DOM markup.
//!
//! Fallback path for pages without a usable payload. Class names on these
//! pages are generated and meaningless, so posts are located through their
//! permalinks (`/@handle/post/<id>`) and everything else is inferred from
//! position and text: the surrounding container, the first profile link in
//! it, the longest caption-like span, and the images that survive the
//! chrome classifier.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::config::{ContentPolicy, ExtractConfig};
use crate::images::{img_selector, img_url, select_images, AncestryHints, ChromeContext, ImageCandidate};
use crate::profile::{element_text, link_label, link_selector, profile_handle, span_selector};
use crate::timestamp::{self, is_short_date, UNKNOWN_TIMESTAMP};
use crate::types::{ExtractStats, Post};

fn permalink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/@[\w.]+/post/([A-Za-z0-9_-]+)/?$").expect("permalink regex is valid")
    })
}

fn handle_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([A-Za-z0-9_.]{1,30})$").expect("handle regex is valid"))
}

fn interaction_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:like|comment|reply|repost|share|more)(?:\s+[\d.,]+[km]?)?$")
            .expect("interaction label regex is valid")
    })
}

fn likes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blikes?\s*(\d+)").expect("likes regex is valid"))
}

fn comments_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:comments?|replies|reply)\s*(\d+)").expect("comments regex is valid")
    })
}

fn time_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("time[datetime]").expect("time selector is valid"))
}

/// Post id carried by a permalink target, if the target is a permalink.
pub fn permalink_id(href: &str) -> Option<&str> {
    permalink_re()
        .captures(href.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Extract posts by walking permalinks in document order.
pub fn extract_dom_posts(
    document: &Html,
    ctx: &ChromeContext,
    fallback_user: Option<&str>,
    config: &ExtractConfig,
    stats: &mut ExtractStats,
) -> Vec<Post> {
    let mut ctx = ctx.clone();
    for avatar in linked_avatars(document) {
        ctx.add_avatar_candidate(&avatar);
    }

    let mut seen_links = HashSet::new();
    let mut posts = Vec::new();

    for link in document.select(link_selector()) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(post_id) = permalink_id(href) else {
            continue;
        };
        if !seen_links.insert(href.to_string()) {
            continue;
        }
        stats.dom_candidates += 1;

        let timestamp = link
            .select(time_selector())
            .find_map(|t| t.value().attr("datetime"))
            .map(timestamp::normalize_text)
            .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string());

        let container = find_container(link, config);
        let user = resolve_username(container)
            .or_else(|| fallback_user.map(str::to_string))
            .unwrap_or_default();
        let content = select_content(container, &user, config.content_policy).unwrap_or_default();

        let mut post = Post::new(user, content, timestamp)
            .with_id(post_id)
            .with_images(container_images(container, &ctx, config));
        let (likes, comments) = engagement(container, &post.content);
        post.likes = likes;
        post.comments = comments;

        if post.is_acceptable() {
            posts.push(post);
        } else {
            stats.dom_rejected += 1;
            tracing::debug!(
                %href,
                user = %post.user,
                content_len = post.content.len(),
                "skipping permalink without usable user/content"
            );
        }
    }

    posts
}

/// Climb from a permalink to the element that holds the whole post.
///
/// Stops at a boundary marker, at the document root, or after
/// `ancestor_ceiling` steps, whichever comes first.
pub fn find_container<'a>(link: ElementRef<'a>, config: &ExtractConfig) -> ElementRef<'a> {
    let mut current = link;
    for _ in 0..config.ancestor_ceiling {
        let Some(parent) = current.parent().and_then(ElementRef::wrap) else {
            break;
        };
        current = parent;
        if is_boundary(current, config) {
            break;
        }
    }
    current
}

fn is_boundary(element: ElementRef<'_>, config: &ExtractConfig) -> bool {
    config
        .post_boundary_markers
        .iter()
        .any(|marker| marker.matches(element.value().attr(&marker.attribute)))
}

/// Username from the container: first labelled profile link, else an
/// `@handle` span.
fn resolve_username(container: ElementRef<'_>) -> Option<String> {
    let from_link = container.select(link_selector()).find_map(|a| {
        let href = a.value().attr("href")?;
        profile_handle(href)?;
        link_label(a)
    });
    if from_link.is_some() {
        return from_link;
    }

    container.select(span_selector()).find_map(|span| {
        let text = element_text(span);
        handle_text_re()
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Caption text among the container's leaf spans.
fn select_content(container: ElementRef<'_>, user: &str, policy: ContentPolicy) -> Option<String> {
    let user = user.trim().trim_start_matches('@');
    let mut best: Option<String> = None;

    for span in container.select(span_selector()) {
        if has_nested_span(span) || inside_link_or_time(span, container) {
            continue;
        }
        let text = element_text(span);
        if text.is_empty()
            || text.trim_start_matches('@') == user
            || is_short_date(&text)
            || interaction_label_re().is_match(&text)
        {
            continue;
        }
        match policy {
            ContentPolicy::First => return Some(text),
            ContentPolicy::Longest => {
                let longer = best
                    .as_ref()
                    .map(|b| text.chars().count() > b.chars().count())
                    .unwrap_or(true);
                if longer {
                    best = Some(text);
                }
            }
        }
    }

    best
}

fn has_nested_span(span: ElementRef<'_>) -> bool {
    span.descendants()
        .skip(1)
        .any(|node| node.value().as_element().map(|e| e.name() == "span").unwrap_or(false))
}

fn inside_link_or_time(element: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == container.id() {
            return false;
        }
        if let Some(el) = ancestor.value().as_element() {
            if matches!(el.name(), "a" | "time") {
                return true;
            }
        }
    }
    false
}

fn container_images(container: ElementRef<'_>, ctx: &ChromeContext, config: &ExtractConfig) -> Vec<String> {
    let candidates: Vec<ImageCandidate> = container
        .select(img_selector())
        .enumerate()
        .map(|(position, img)| {
            let el = img.value();
            let (in_media_link, ancestry) = image_surroundings(img, container, config);
            ImageCandidate::new(img_url(el).map(str::to_string), position)
                .with_dimensions(parse_dimension(el.attr("width")), parse_dimension(el.attr("height")))
                .in_media_link(in_media_link)
                .with_ancestry(ancestry)
        })
        .collect();
    select_images(&candidates, ctx, config)
}

/// Media-link membership and chrome hints from an image's ancestors below
/// the container.
fn image_surroundings(
    img: ElementRef<'_>,
    container: ElementRef<'_>,
    config: &ExtractConfig,
) -> (bool, AncestryHints) {
    let mut in_media_link = false;
    let mut hints = AncestryHints::default();
    let mut depth = 0;

    for ancestor in img.ancestors() {
        if ancestor.id() == container.id() {
            break;
        }
        let Some(el) = ancestor.value().as_element() else {
            continue;
        };
        if el.name() == "a" {
            if let Some(href) = el.attr("href") {
                if href.contains(config.media_link_marker.as_str()) {
                    in_media_link = true;
                }
                if profile_handle(href).is_some() {
                    hints.in_profile_link = true;
                }
            }
        }
        if depth < config.chrome_ancestry_depth {
            hints.tokens.extend(el.classes().map(str::to_ascii_lowercase));
            for attr in ["id", "role"] {
                if let Some(value) = el.attr(attr) {
                    hints.tokens.push(value.to_ascii_lowercase());
                }
            }
        }
        depth += 1;
    }

    (in_media_link, hints)
}

fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let raw = raw.strip_suffix("px").unwrap_or(raw).trim();
    raw.parse::<u32>()
        .ok()
        .or_else(|| raw.parse::<f32>().ok().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u32))
}

/// Images wrapped by profile links anywhere in the document; these are the
/// avatars that lead each feed row.
fn linked_avatars(document: &Html) -> Vec<String> {
    document
        .select(link_selector())
        .filter(|a| a.value().attr("href").and_then(profile_handle).is_some())
        .flat_map(|a| {
            a.select(img_selector())
                .filter_map(|img| img_url(img.value()).map(str::to_string))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Like/comment counters from the container's text and aria labels, with
/// the caption removed so numbers inside it are not mistaken for counters.
fn engagement(container: ElementRef<'_>, content: &str) -> (u64, u64) {
    let mut pieces: Vec<&str> = Vec::new();
    for node in container.descendants() {
        match node.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pieces.push(text);
                }
            }
            Node::Element(el) => {
                if let Some(label) = el.attr("aria-label") {
                    pieces.push(label);
                }
            }
            _ => {}
        }
    }
    let stream = pieces.join(" ");
    let stream = stream.split_whitespace().collect::<Vec<_>>().join(" ");
    let stream = if content.is_empty() {
        stream
    } else {
        stream.replacen(content, " ", 1)
    };

    let count = |re: &Regex| {
        re.captures(&stream)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    (count(likes_re()), count(comments_re()))
}
