//! Post extraction from embedded JSON payloads.
//!
//! Feed pages ship the data their client renders from inside
//! `<script type="application/json">` blocks. The layout of those blocks
//! changes between deployments, so the post list is located by key name
//! anywhere in the tree (see [`crate::tree`]) and every field is read with a
//! list of fallbacks observed across schema revisions.

use std::borrow::Cow;

use scraper::{Html, Selector};
use serde_json::Value;

use crate::config::ExtractConfig;
use crate::images::{select_images, ChromeContext, ImageCandidate};
use crate::timestamp;
use crate::tree::collect_under_keys;
use crate::types::{ExtractStats, Post};

/// What became of one payload entry.
#[derive(Debug)]
enum ItemOutcome {
    Accepted(Post),
    Reply,
    EmptyCaption,
    Rejected,
}

/// Parse every payload block and return the accepted posts in payload order.
///
/// Malformed blocks are skipped; an empty result means the caller should
/// fall back to the DOM heuristics.
pub fn extract_payload_posts(
    document: &Html,
    selector: &Selector,
    ctx: &ChromeContext,
    fallback_user: Option<&str>,
    config: &ExtractConfig,
    stats: &mut ExtractStats,
) -> Vec<Post> {
    let mut posts = Vec::new();

    for (index, script) in document.select(selector).enumerate() {
        stats.payload_blocks += 1;
        let text = script.text().collect::<String>();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                stats.malformed_blocks += 1;
                tracing::debug!(block = index, error = %e, "skipping malformed payload block");
                continue;
            }
        };

        for item in collect_under_keys(&value, &config.thread_item_keys) {
            stats.payload_items += 1;
            match parse_item(item, ctx, fallback_user, config) {
                ItemOutcome::Accepted(post) => posts.push(post),
                ItemOutcome::Reply => stats.replies_skipped += 1,
                ItemOutcome::EmptyCaption => stats.empty_captions += 1,
                ItemOutcome::Rejected => stats.payload_rejected += 1,
            }
        }
    }

    posts
}

fn parse_item(
    item: &Value,
    ctx: &ChromeContext,
    fallback_user: Option<&str>,
    config: &ExtractConfig,
) -> ItemOutcome {
    if !item.is_object() {
        return ItemOutcome::Rejected;
    }
    let post = item.get("post").filter(|p| p.is_object()).unwrap_or(item);

    if config.skip_replies && is_reply(item, post, &config.reply_keys) {
        return ItemOutcome::Reply;
    }

    let caption = first_str(
        post,
        &[&["caption", "text"], &["caption"], &["text"], &["content"]],
    )
    .map(str::trim)
    .unwrap_or("");
    if caption.is_empty() {
        return ItemOutcome::EmptyCaption;
    }

    let user = first_str(
        post,
        &[&["user", "username"], &["owner", "username"], &["user"], &["author"]],
    )
    .map(str::trim)
    .filter(|u| !u.is_empty())
    .or(fallback_user)
    .unwrap_or("")
    .to_string();

    let raw_timestamp = ["taken_at", "creation_time", "datetime", "timestamp", "created_at"]
        .iter()
        .find_map(|key| post.get(*key).filter(|v| !v.is_null()));

    // The owner's profile picture is an avatar candidate for this entry only.
    let ctx = match first_str(post, &[&["user", "profile_pic_url"], &["owner", "profile_pic_url"]]) {
        Some(pic) => {
            let mut owned = ctx.clone();
            owned.add_avatar_candidate(pic);
            Cow::Owned(owned)
        }
        None => Cow::Borrowed(ctx),
    };
    let images = select_images(&image_candidates(post), &ctx, config);

    let mut parsed = Post::new(user, caption, timestamp::normalize_value(raw_timestamp))
        .with_images(images);
    // `code` is the permalink segment, the id the DOM path assigns.
    parsed.id = ["code", "id", "pk"]
        .iter()
        .find_map(|key| post.get(*key).and_then(scalar_string));
    parsed.likes = first_u64(post, &[&["like_count"], &["likes"]]).unwrap_or(0);
    parsed.comments = first_u64(
        post,
        &[
            &["text_post_app_info", "direct_reply_count"],
            &["comment_count"],
            &["comments"],
        ],
    )
    .unwrap_or(0);

    if parsed.is_acceptable() {
        ItemOutcome::Accepted(parsed)
    } else {
        tracing::debug!(user = %parsed.user, "rejecting payload entry without usable user/content");
        ItemOutcome::Rejected
    }
}

/// Image candidates in payload order: resolution candidates, carousel
/// entries, typed media entries, then bare image fields.
fn image_candidates(post: &Value) -> Vec<ImageCandidate> {
    let mut found: Vec<(Option<String>, Option<u32>, Option<u32>)> = Vec::new();

    let mut push_version = |version: &Value| {
        found.push((
            version.get("url").and_then(Value::as_str).map(str::to_string),
            version.get("width").and_then(dimension),
            version.get("height").and_then(dimension),
        ));
    };

    if let Some(candidates) = path(post, &["image_versions2", "candidates"]).and_then(Value::as_array) {
        candidates.iter().for_each(&mut push_version);
    }
    if let Some(carousel) = post.get("carousel_media").and_then(Value::as_array) {
        for media in carousel {
            if let Some(first) = path(media, &["image_versions2", "candidates"])
                .and_then(Value::as_array)
                .and_then(|c| c.first())
            {
                push_version(first);
            }
        }
    }
    if let Some(media) = post.get("media").and_then(Value::as_array) {
        for entry in media {
            let is_image = entry
                .get("type")
                .and_then(Value::as_str)
                .map(|t| t.eq_ignore_ascii_case("image"))
                .unwrap_or(false);
            if is_image {
                push_version(entry);
            }
        }
    }
    for key in ["image", "image_url"] {
        if let Some(url) = post.get(key).and_then(Value::as_str) {
            found.push((Some(url.to_string()), None, None));
        }
    }

    found
        .into_iter()
        .enumerate()
        .map(|(position, (url, width, height))| {
            ImageCandidate::new(url, position).with_dimensions(width, height)
        })
        .collect()
}

fn is_reply(item: &Value, post: &Value, reply_keys: &[String]) -> bool {
    let scopes = [Some(item), Some(post), post.get("text_post_app_info")];
    scopes.into_iter().flatten().any(|scope| {
        reply_keys
            .iter()
            .any(|key| scope.get(key).map(is_present).unwrap_or(false))
    })
}

/// Whether a reference field carries a value.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |v, key| v.get(*key))
}

fn first_str<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|p| path(value, p).and_then(Value::as_str).filter(|s| !s.trim().is_empty()))
}

fn first_u64(value: &Value, paths: &[&[&str]]) -> Option<u64> {
    paths.iter().find_map(|p| {
        path(value, p).and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        })
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dimension(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
        .and_then(|d| u32::try_from(d).ok())
}
