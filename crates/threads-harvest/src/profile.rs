//! Profile-link recognition and page-owner handle resolution.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

fn profile_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://[^/]+)?/@([A-Za-z0-9_.]+)/?$").expect("profile link regex is valid")
    })
}

pub(crate) fn link_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("link selector is valid"))
}

pub(crate) fn span_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span").expect("span selector is valid"))
}

/// Handle named by a profile link target (`/@handle`), if it is one.
pub fn profile_handle(href: &str) -> Option<&str> {
    profile_link_re()
        .captures(href.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Label of a profile link: its first non-empty span, else its own text.
pub fn link_label(link: ElementRef<'_>) -> Option<String> {
    link.select(span_selector())
        .map(element_text)
        .find(|text| !text.is_empty())
        .or_else(|| Some(element_text(link)).filter(|text| !text.is_empty()))
}

/// First profile link under `scope`, as `(link, handle)`.
pub fn first_profile_link<'a>(scope: ElementRef<'a>) -> Option<(ElementRef<'a>, String)> {
    scope.select(link_selector()).find_map(|a| {
        let href = a.value().attr("href")?;
        profile_handle(href).map(|handle| (a, handle.to_string()))
    })
}

/// Handle of the page owner: label of the first profile link in document
/// order, or the handle from its target when the label is empty.
pub fn resolve_profile_username(document: &Html) -> Option<String> {
    let (link, handle) = first_profile_link(document.root_element())?;
    let username = link_label(link).unwrap_or(handle);
    tracing::debug!(%username, "resolved profile username");
    Some(username)
}
