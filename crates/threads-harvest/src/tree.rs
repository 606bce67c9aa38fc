//! Depth-agnostic keyed search over tree-shaped documents.
//!
//! Embedded feed payloads move the post list between parent keys from one
//! deployment to the next. Rather than hard-coding a path such as
//! `props.pageProps.feed.threads[].thread_items`, the payload extractor asks
//! for every sequence stored under a known key name, wherever it sits.
//!
//! The walk is written against [`TreeNode`], a minimal tagged-union view
//! (map / sequence / leaf), so it does not depend on a particular parsed
//! document type. `serde_json::Value` implements it.

use serde_json::Value;

/// One level of a tree node.
pub enum NodeView<'a, T: ?Sized> {
    /// Keyed children, in document order.
    Map(Vec<(&'a str, &'a T)>),
    /// Positional children.
    Seq(Vec<&'a T>),
    /// A scalar with no children.
    Leaf,
}

/// A node that can be viewed as map, sequence or scalar.
pub trait TreeNode {
    fn view(&self) -> NodeView<'_, Self>;
}

impl TreeNode for Value {
    fn view(&self) -> NodeView<'_, Self> {
        match self {
            Value::Object(map) => NodeView::Map(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
            Value::Array(items) => NodeView::Seq(items.iter().collect()),
            _ => NodeView::Leaf,
        }
    }
}

/// Pending work for the explicit-stack walk.
enum Step<'a, T> {
    /// Search this node for matching keys.
    Visit(&'a T),
    /// Emit the elements of a matched sequence.
    Emit(Vec<&'a T>),
}

/// Collect the elements of every sequence stored under one of `keys`,
/// concatenated in document order regardless of nesting depth.
///
/// A matched sequence is not searched further. A matching key whose value is
/// not a sequence is walked like any other value.
pub fn collect_under_keys<'a, T: TreeNode>(root: &'a T, keys: &[String]) -> Vec<&'a T> {
    let mut found = Vec::new();
    let mut stack = vec![Step::Visit(root)];

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Emit(items) => {
                found.extend(items);
                continue;
            }
            Step::Visit(node) => node,
        };
        match node.view() {
            NodeView::Map(entries) => {
                // Reverse push so children pop in document order.
                for (key, child) in entries.into_iter().rev() {
                    if keys.iter().any(|k| k == key) {
                        if let NodeView::Seq(items) = child.view() {
                            stack.push(Step::Emit(items));
                            continue;
                        }
                    }
                    stack.push(Step::Visit(child));
                }
            }
            NodeView::Seq(items) => {
                for child in items.into_iter().rev() {
                    stack.push(Step::Visit(child));
                }
            }
            NodeView::Leaf => {}
        }
    }

    found
}

/// Convenience wrapper over [`collect_under_keys`] for a single key.
pub fn collect_under_key<'a, T: TreeNode>(root: &'a T, key: &str) -> Vec<&'a T> {
    collect_under_keys(root, &[key.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collects_across_depths_in_order() {
        let doc = json!({
            "a": {"thread_items": [1, 2]},
            "b": [
                {"thread_items": [3]},
                {"c": {"thread_items": [4]}}
            ]
        });
        let found = collect_under_key(&doc, "thread_items");
        let values: Vec<i64> = found.iter().filter_map(|v| v.as_i64()).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_matched_sequences_are_not_descended() {
        let doc = json!({
            "thread_items": [
                {"post": {"id": "outer"}, "thread_items": [{"post": {"id": "inner"}}]}
            ]
        });
        let found = collect_under_key(&doc, "thread_items");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["post"]["id"], "outer");
    }

    #[test]
    fn test_synonym_keys() {
        let doc = json!({
            "old": {"thread_items": [{"n": 1}]},
            "new": {"deep": {"threadItems": [{"n": 2}, {"n": 3}]}}
        });
        let keys = vec!["thread_items".to_string(), "threadItems".to_string()];
        let found = collect_under_keys(&doc, &keys);
        let ns: Vec<i64> = found.iter().filter_map(|v| v["n"].as_i64()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_non_sequence_match_is_walked() {
        let doc = json!({"thread_items": {"nested": {"thread_items": ["x"]}}});
        let found = collect_under_key(&doc, "thread_items");
        assert_eq!(found, vec![&json!("x")]);
    }

    #[test]
    fn test_no_matches() {
        let doc = json!({"props": {"pageProps": {}}, "list": [1, "two", null]});
        assert!(collect_under_key(&doc, "thread_items").is_empty());
        assert!(collect_under_key(&json!(42), "thread_items").is_empty());
    }
}
