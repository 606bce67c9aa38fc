//! threads-harvest: post extraction from rendered profile-feed pages.
//!
//! One markup document goes in, a clean list of posts comes out. Embedded
//! JSON payloads are tried first; when they yield nothing, posts are
//! recovered from the DOM around permalinks. Results are deduplicated and
//! can be merged into a stored history newest first.

pub mod config;
pub mod dedup;
pub mod dom;
pub mod extract;
pub mod images;
pub mod payload;
pub mod profile;
pub mod store;
pub mod timestamp;
pub mod tree;
pub mod types;

pub use config::{BoundaryMarker, ContentPolicy, ExtractConfig};
pub use dedup::{dedup, dedup_key, merge, merge_sorted, sort_newest_first, DedupKey, SeenKeys};
pub use extract::{Extractor, ScrollSession};
pub use images::{ChromeContext, ImageFrequency};
pub use store::{
    harvest, HarvestReport, JsonFilePostStore, JsonRunHistory, MemoryPostStore, MemoryRunStatus,
    PostStore, RunStatusSink,
};
pub use tree::{collect_under_key, collect_under_keys, NodeView, TreeNode};
pub use types::*;
