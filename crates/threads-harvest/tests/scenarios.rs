//! End-to-end extraction scenarios over synthetic feed pages.

use serde_json::json;

use threads_harvest::*;

// ─────────────────────── helpers ───────────────────────

/// Route library logs to the test writer. Set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn page_with_payload(payload: &serde_json::Value) -> String {
    format!(
        r#"<html><head><script type="application/json">{payload}</script></head><body><div id="root"></div></body></html>"#
    )
}

fn post(content: &str, ts: &str) -> Post {
    Post::new("j.p_morgan_trading", content, ts)
}

// ═══════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════

/// Scenario A: two top-level payload items plus one reply.
#[test]
fn test_a_payload_skips_reply() {
    init_tracing();
    let payload = json!({
        "require": [["ScheduledServerJS", {"result": {"data": {"mediaData": {"edges": [{
            "node": {"thread_items": [
                {"post": {"pk": "101", "user": {"username": "owner"},
                          "caption": {"text": "Gold long from 2320"}, "taken_at": 1718528101}},
                {"post": {"pk": "102", "user": {"username": "owner"},
                          "caption": {"text": "Replying to myself"}, "taken_at": 1718528200,
                          "text_post_app_info": {"reply_to_author": {"username": "owner"}}}},
                {"post": {"pk": "103", "user": {"username": "owner"},
                          "caption": {"text": "Closed half at 2341"}, "taken_at": 1718531701}}
            ]}
        }]}}}}]]
    });

    let extractor = Extractor::with_defaults().unwrap();
    let out = extractor.extract(&page_with_payload(&payload), &ExtractHints::default());

    assert_eq!(out.source, ExtractionSource::Payload);
    assert_eq!(out.posts.len(), 2);
    assert_eq!(out.posts[0].content, "Gold long from 2320");
    assert_eq!(out.posts[1].content, "Closed half at 2341");
    assert!(out.posts.iter().all(|p| p.content != "Replying to myself"));
    assert_eq!(out.stats.replies_skipped, 1);
}

/// Scenario B: no payload, one permalink with a nested profile link.
#[test]
fn test_b_dom_fallback_resolves_user() {
    init_tracing();
    let caption = "Watching 2350 as resistance on the 4h tf";
    assert_eq!(caption.chars().count(), 40);
    let html = format!(
        r#"<html><body><div class="x1n2onr6">
          <div class="x78zum5">
            <div><a href="/@alice" role="link"><span class="x1lliihq">alice</span></a></div>
            <a href="/@alice/post/C9fGh2"><time datetime="2025-06-16T08:55:01.000Z">06/16/25</time></a>
          </div>
          <div><span dir="auto"><span>{caption}</span></span></div>
        </div></body></html>"#
    );

    let extractor = Extractor::with_defaults().unwrap();
    let out = extractor.extract(&html, &ExtractHints::default());

    assert_eq!(out.source, ExtractionSource::Dom);
    assert_eq!(out.posts.len(), 1);
    assert_eq!(out.posts[0].user, "alice");
    assert_eq!(out.posts[0].content, caption);
    assert_eq!(out.posts[0].id.as_deref(), Some("C9fGh2"));
}

/// Scenario C: avatar, icon and one real image in the same container.
#[test]
fn test_c_only_content_image_survives() {
    init_tracing();
    let html = r#"<html><body><div data-pressable-container="true">
      <a href="/@alice"><span>alice</span></a>
      <a href="/@alice/post/C1"><time datetime="2025-06-16T08:55:01.000Z">1h</time></a>
      <img src="https://scontent.cdn/alice_avatar.jpg?stp=dst-jpg_s150x150" alt="">
      <span>Entry zone marked on the chart below</span>
      <img src="https://static.cdn/verified.png" width="16" height="16">
      <img src="https://scontent.cdn/chart_0616.jpg?stp=dst-jpg_p1080x1080">
    </div></body></html>"#;
    let hints = ExtractHints::default().with_avatar("https://scontent.cdn/alice_avatar.jpg?stp=dst-jpg_s320x320");

    let extractor = Extractor::with_defaults().unwrap();
    let out = extractor.extract(html, &hints);

    assert_eq!(out.posts.len(), 1);
    let images = out.posts[0].images.as_ref().expect("post keeps its chart");
    assert_eq!(images.len(), 1);
    assert!(images[0].contains("chart_0616.jpg"));
}

/// Scenario D: 3 fresh posts (2 new, 1 duplicate) merged into 5 stored.
#[test]
fn test_d_merge_with_stored_history() {
    let stored = vec![
        post("stored 5", "2025-06-15T10:00:00Z"),
        post("stored 4", "2025-06-14T10:00:00Z"),
        post("stored 3", "2025-06-13T10:00:00Z"),
        post("stored 2", "2025-06-12T10:00:00Z"),
        post("stored 1", "2025-06-11T10:00:00Z"),
    ];
    let fresh = vec![
        post("fresh b", "2025-06-16T12:00:00Z"),
        post("stored 4", "2025-06-14T10:00:00Z"),
        post("fresh a", "2025-06-16T09:00:00Z"),
    ];

    let merged = merge_sorted(fresh, stored);
    assert_eq!(merged.len(), 7);
    assert!(merged.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert_eq!(merged[0].content, "fresh b");
    assert_eq!(merged[6].content, "stored 1");
}

// ═══════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════

#[test]
fn test_harvest_into_json_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFilePostStore::new(dir.path().join("data").join("posts.json"));
    let mut status = JsonRunHistory::new(dir.path().join("data").join("history.json"), "payload");
    let extractor = Extractor::with_defaults().unwrap();

    let first = page_with_payload(&json!({"thread_items": [
        {"post": {"pk": "1", "user": {"username": "t"}, "caption": {"text": "one"}, "taken_at": 1718528101}}
    ]}));
    let second = page_with_payload(&json!({"thread_items": [
        {"post": {"pk": "2", "user": {"username": "t"}, "caption": {"text": "two"}, "taken_at": 1718531701}},
        {"post": {"pk": "1", "user": {"username": "t"}, "caption": {"text": "one"}, "taken_at": 1718528101}}
    ]}));

    let report = harvest(&extractor, &first, &ExtractHints::default(), &mut store, &mut status).unwrap();
    assert_eq!((report.extracted, report.new_posts, report.total), (1, 1, 1));

    let report = harvest(&extractor, &second, &ExtractHints::default(), &mut store, &mut status).unwrap();
    assert_eq!((report.extracted, report.new_posts, report.total), (2, 1, 2));

    let saved = store.existing_posts().unwrap();
    assert_eq!(saved[0].id.as_deref(), Some("2"));
    assert_eq!(saved[1].id.as_deref(), Some("1"));

    let periods = status.periods().unwrap();
    assert_eq!(periods.len(), 1);
    assert!(periods[0].end.is_none());
}
