//! Session state for one run and the dedup/merge engine that feeds it.

use super::identity::IdentityKeys;
use crate::scraping::feed_scraper::normalize::normalize_lower;
use crate::types::{IdentityTier, PostLink, PostRecord, RawPost, RunOptions};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const MAX_LINKS_PER_RECORD: usize = 30;

/// What `SessionState::merge` did with one raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Appended as a new record at this index.
    Inserted(usize),
    /// Folded into the existing record at this index.
    Merged(usize),
    /// New post whose text does not contain the filter.
    Filtered,
    /// Nothing identifiable in the fragment.
    Skipped,
}

impl MergeOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, MergeOutcome::Inserted(_))
    }
}

/// Ordered collection of records for one run plus the counters the controller steers by.
///
/// Insertion order is first-discovery order and is what the report shows.
#[derive(Debug, Default)]
pub struct SessionState {
    records: Vec<PostRecord>,
    /// Every identity key a record answers to → index into `records`.
    aliases: HashMap<String, usize>,
    filter: Option<String>,
    step: usize,
    no_new_passes: usize,
}

impl SessionState {
    pub fn new(options: &RunOptions) -> Self {
        Self {
            filter: options.filter_needle(),
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[PostRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PostRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Scroll cycles performed so far.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn advance_step(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    /// Consecutive passes that inserted nothing.
    pub fn no_new_passes(&self) -> usize {
        self.no_new_passes
    }

    /// Update the no-new counter after a pass and return it.
    pub fn record_pass(&mut self, inserted: usize) -> usize {
        if inserted == 0 {
            self.no_new_passes += 1;
        } else {
            self.no_new_passes = 0;
        }
        self.no_new_passes
    }

    fn passes_filter(&self, raw: &RawPost) -> bool {
        match &self.filter {
            Some(needle) => normalize_lower(&raw.text).contains(needle.as_str()),
            None => true,
        }
    }

    /// Find the record an incoming post belongs to: permalink key, then composite, then
    /// degenerate. A non-permalink hit is refused when both sides carry different permalinks.
    fn lookup(&self, keys: &IdentityKeys, raw: &RawPost) -> Option<usize> {
        if let Some(idx) = keys.permalink.as_ref().and_then(|k| self.aliases.get(k)) {
            return Some(*idx);
        }
        let fallback = [
            keys.composite.as_deref(),
            keys.degenerate.as_ref().map(|(_, k)| k.as_str()),
        ];
        for key in fallback.into_iter().flatten() {
            let Some(&idx) = self.aliases.get(key) else {
                continue;
            };
            let existing = &self.records[idx];
            if let (Some(a), Some(b)) = (&existing.permalink, &raw.permalink) {
                if a != b {
                    debug!("identity {} matched but permalinks differ, keeping apart", key);
                    continue;
                }
            }
            return Some(idx);
        }
        None
    }

    fn register(&mut self, keys: &IdentityKeys, idx: usize) {
        let degenerate_record = self.records[idx].identity_tier.is_degenerate();
        let mut candidates: Vec<&str> = Vec::with_capacity(3);
        candidates.extend(keys.permalink.as_deref());
        candidates.extend(keys.composite.as_deref());
        if degenerate_record {
            candidates.extend(keys.degenerate.as_ref().map(|(_, k)| k.as_str()));
        }
        for key in candidates {
            self.aliases.entry(key.to_string()).or_insert(idx);
        }
    }

    /// Insert a freshly extracted record or fold it into the one it duplicates.
    pub fn merge(&mut self, raw: RawPost, step: usize) -> MergeOutcome {
        let keys = IdentityKeys::derive(&raw);
        let Some((tier, primary)) = keys.primary() else {
            debug!("skipping fragment without identifiable content");
            return MergeOutcome::Skipped;
        };

        if let Some(idx) = self.lookup(&keys, &raw) {
            merge_into(&mut self.records[idx], raw, step);
            self.register(&keys, idx);
            return MergeOutcome::Merged(idx);
        }

        if !self.passes_filter(&raw) {
            return MergeOutcome::Filtered;
        }

        let idx = self.records.len();
        self.records.push(new_record(primary.to_string(), tier, raw, step));
        self.register(&keys, idx);
        MergeOutcome::Inserted(idx)
    }
}

fn new_record(identity_key: String, tier: IdentityTier, raw: RawPost, step: usize) -> PostRecord {
    let mut record = PostRecord {
        identity_key,
        identity_tier: tier,
        author: raw.author,
        timestamp: raw.timestamp,
        text: raw.text,
        permalink: raw.permalink,
        media_urls: Vec::new(),
        links: Vec::new(),
        first_seen_step: step,
        last_seen_step: step,
        times_seen: 1,
    };
    append_unique(&mut record.media_urls, raw.media_urls);
    append_links(&mut record.links, raw.links);
    record
}

/// Enrich, never regress: existing non-empty values stay, gaps are filled, sets grow.
fn merge_into(existing: &mut PostRecord, raw: RawPost, step: usize) {
    if existing.author.is_none() {
        existing.author = raw.author;
    }
    if let Some(incoming) = raw.timestamp {
        match existing.timestamp.as_mut() {
            None => existing.timestamp = Some(incoming),
            Some(current) => {
                if current.parsed.is_none() && current.raw == incoming.raw {
                    current.parsed = incoming.parsed;
                }
            }
        }
    }
    if existing.text.is_empty() {
        existing.text = raw.text;
    }
    if existing.permalink.is_none() {
        existing.permalink = raw.permalink;
    }
    append_unique(&mut existing.media_urls, raw.media_urls);
    append_links(&mut existing.links, raw.links);
    existing.last_seen_step = existing.last_seen_step.max(step);
    existing.times_seen += 1;
}

fn append_unique(target: &mut Vec<String>, incoming: Vec<String>) {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for item in incoming {
        if seen.insert(item.clone()) {
            target.push(item);
        }
    }
}

fn append_links(target: &mut Vec<PostLink>, incoming: Vec<PostLink>) {
    let mut seen: HashSet<String> = target.iter().map(|l| l.href.clone()).collect();
    for link in incoming {
        if target.len() >= MAX_LINKS_PER_RECORD {
            break;
        }
        if seen.insert(link.href.clone()) {
            target.push(link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostTimestamp;
    use chrono::{TimeZone, Utc};

    fn raw(author: Option<&str>, ts: Option<&str>, text: &str) -> RawPost {
        RawPost {
            author: author.map(str::to_string),
            timestamp: ts.map(|t| PostTimestamp::new(t, None)),
            text: text.to_string(),
            ..RawPost::default()
        }
    }

    fn session() -> SessionState {
        SessionState::new(&RunOptions::default())
    }

    #[test]
    fn test_insert_then_merge_same_post() {
        let mut s = session();
        let a = raw(Some("Alice"), Some("14 November"), "Hello there");
        assert_eq!(s.merge(a.clone(), 0), MergeOutcome::Inserted(0));
        assert_eq!(s.merge(a, 1), MergeOutcome::Merged(0));
        assert_eq!(s.len(), 1);
        let r = &s.records()[0];
        assert_eq!(r.first_seen_step, 0);
        assert_eq!(r.last_seen_step, 1);
        assert_eq!(r.times_seen, 2);
        assert_eq!(r.identity_tier, IdentityTier::Composite);
    }

    #[test]
    fn test_permalink_seen_later_keeps_one_record() {
        let mut s = session();
        s.merge(raw(Some("Alice"), Some("14 November"), "Hello there"), 0);

        let mut later = raw(Some("Alice"), Some("14 November"), "Hello there");
        later.permalink = Some("https://facebook.com/groups/1/posts/9".into());
        later.media_urls = vec!["https://cdn.example.com/p.jpg".into()];
        assert_eq!(s.merge(later, 1), MergeOutcome::Merged(0));

        // now reachable by permalink alone even when the rest of the header is missing
        let mut bare = raw(None, None, "");
        bare.permalink = Some("https://facebook.com/groups/1/posts/9".into());
        assert_eq!(s.merge(bare, 2), MergeOutcome::Merged(0));

        let r = &s.records()[0];
        assert_eq!(s.len(), 1);
        assert_eq!(r.author.as_deref(), Some("Alice"));
        assert_eq!(r.permalink.as_deref(), Some("https://facebook.com/groups/1/posts/9"));
        assert_eq!(r.media_urls.len(), 1);
        assert!(r.identity_key.starts_with("composite:"));
    }

    #[test]
    fn test_same_composite_different_permalinks_stay_apart() {
        let mut s = session();
        let mut a = raw(Some("Alice"), Some("14 November"), "Same words");
        a.permalink = Some("https://facebook.com/posts/1".into());
        let mut b = a.clone();
        b.permalink = Some("https://facebook.com/posts/2".into());
        assert!(s.merge(a, 0).is_new());
        assert!(s.merge(b, 0).is_new());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_timestamp_gains_parsed_instant() {
        let mut s = session();
        s.merge(raw(Some("Alice"), Some("14 November"), "x"), 0);
        let mut again = raw(Some("Alice"), Some("14 November"), "x");
        let when = Utc.with_ymd_and_hms(2024, 11, 14, 0, 0, 0).unwrap();
        again.timestamp = Some(PostTimestamp::new("14 November", Some(when)));
        s.merge(again, 1);
        assert_eq!(s.records()[0].timestamp.as_ref().unwrap().parsed, Some(when));
    }

    #[test]
    fn test_sets_append_without_reordering() {
        let mut s = session();
        let mut a = raw(Some("Alice"), Some("14 November"), "x");
        a.media_urls = vec!["u1".into(), "u2".into()];
        a.links = vec![PostLink { href: "h1".into(), text: "one".into() }];
        s.merge(a, 0);
        let mut b = raw(Some("Alice"), Some("14 November"), "x");
        b.media_urls = vec!["u3".into(), "u1".into()];
        b.links = vec![
            PostLink { href: "h2".into(), text: "two".into() },
            PostLink { href: "h1".into(), text: "changed".into() },
        ];
        s.merge(b, 1);
        let r = &s.records()[0];
        assert_eq!(r.media_urls, vec!["u1", "u2", "u3"]);
        assert_eq!(r.links.len(), 2);
        assert_eq!(r.links[0].text, "one");
    }

    #[test]
    fn test_filter_blocks_insert_but_not_merge() {
        let mut s = SessionState::new(&RunOptions {
            text_filter: Some("  BIKE ".into()),
            ..RunOptions::default()
        });
        assert_eq!(s.filter(), Some("bike"));
        assert_eq!(
            s.merge(raw(Some("Bob"), Some("May 3"), "Selling a sofa"), 0),
            MergeOutcome::Filtered
        );
        assert!(s.merge(raw(Some("Bob"), Some("May 4"), "Selling a Bike"), 0).is_new());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_empty_shell_skipped() {
        let mut s = session();
        assert_eq!(s.merge(RawPost::default(), 0), MergeOutcome::Skipped);
        assert!(s.is_empty());
    }

    #[test]
    fn test_no_new_counter() {
        let mut s = session();
        assert_eq!(s.record_pass(0), 1);
        assert_eq!(s.record_pass(0), 2);
        assert_eq!(s.record_pass(3), 0);
        assert_eq!(s.no_new_passes(), 0);
        assert_eq!(s.advance_step(), 1);
        assert_eq!(s.step(), 1);
    }
}
