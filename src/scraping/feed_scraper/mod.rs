//! Snapshot → raw posts.
//!
//! Parsing is synchronous: `scraper::Html` is not `Send`, so callers run this between
//! awaits and hand back owned [`RawPost`]s.

pub mod extract;
pub mod media;
pub mod normalize;
pub mod segment;
pub mod timestamp;

use crate::types::RawPost;
use chrono::{DateTime, Utc};
use extract::FieldExtractor;
use scraper::Html;
use segment::{FragmentOrigin, Segmenter};
use tracing::debug;
use url::Url;

/// Per-snapshot inputs shared by every fragment.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Page address used to absolutize relative links and media.
    pub base_url: Option<Url>,
    /// Anchor for relative times ("2 h").
    pub reference_time: DateTime<Utc>,
}

impl ExtractContext {
    pub fn new(page_url: Option<&str>, reference_time: DateTime<Utc>) -> Self {
        Self {
            base_url: page_url.and_then(|u| Url::parse(u).ok()),
            reference_time,
        }
    }
}

/// Counters for one snapshot, logged by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub fragments: usize,
    pub from_fallback: usize,
}

/// Segmenter plus field extractor, compiled once per run.
#[derive(Default)]
pub struct FeedScraper {
    segmenter: Segmenter,
    extractor: FieldExtractor,
}

impl FeedScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw posts of one snapshot in document order.
    pub fn extract_snapshot(&self, markup: &str, ctx: &ExtractContext) -> Vec<RawPost> {
        self.extract_snapshot_with_stats(markup, ctx).0
    }

    pub fn extract_snapshot_with_stats(
        &self,
        markup: &str,
        ctx: &ExtractContext,
    ) -> (Vec<RawPost>, SnapshotStats) {
        let doc = Html::parse_document(markup);
        let mut stats = SnapshotStats::default();
        let posts: Vec<RawPost> = self
            .segmenter
            .segment(&doc)
            .map(|frag| {
                stats.fragments += 1;
                if frag.origin == FragmentOrigin::RepeatedClass {
                    stats.from_fallback += 1;
                }
                self.extractor.extract(&frag.element, ctx)
            })
            .collect();
        debug!(
            "snapshot: {} bytes, {} fragments ({} via fallback)",
            markup.len(),
            stats.fragments,
            stats.from_fallback
        );
        (posts, stats)
    }
}
