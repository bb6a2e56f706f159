//! Identity keys: how the same logical post is recognized across snapshots.
//!
//! Tiers, first qualifying wins for a record's own key:
//! 1. `permalink:<normalized url>`
//! 2. `composite:<hash>` of author, timestamp and the first 160 characters of text
//! 3. `content:<hash>` of text alone, when author and timestamp are both unknown
//! 4. `media:<hash>` of the media list when there is no text either
//!
//! Relative times ("2 h") drift while the run scrolls, so they never feed a key.

use crate::scraping::feed_scraper::normalize::{char_prefix, normalize_lower};
use crate::scraping::feed_scraper::timestamp::is_relative;
use crate::types::{IdentityTier, RawPost};
use sha2::{Digest, Sha256};

/// Characters of normalized text that take part in text fingerprints.
pub const FINGERPRINT_CHARS: usize = 160;
/// Hex characters kept from each SHA-256 digest.
const KEY_HEX_LEN: usize = 24;

/// SHA-256 over the parts (unit-separator joined), truncated hex.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..KEY_HEX_LEN].to_string()
}

/// Every key one raw record qualifies for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys {
    pub permalink: Option<String>,
    pub composite: Option<String>,
    /// Content or media key; only set when neither author nor a stable time is known.
    pub degenerate: Option<(IdentityTier, String)>,
}

impl IdentityKeys {
    pub fn derive(raw: &RawPost) -> Self {
        let permalink = raw
            .permalink
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("permalink:{}", p));

        let author = raw
            .author
            .as_deref()
            .map(normalize_lower)
            .filter(|a| !a.is_empty());
        let stable_time = raw
            .timestamp
            .as_ref()
            .map(|t| normalize_lower(&t.raw))
            .filter(|t| !t.is_empty() && !is_relative(t));
        let text = normalize_lower(&raw.text);
        let text_prefix = char_prefix(&text, FINGERPRINT_CHARS);

        let has_author = author.is_some();
        let has_time = stable_time.is_some();
        let composite = ((has_author || has_time)
            && (!text_prefix.is_empty() || (has_author && has_time)))
            .then(|| {
                let h = fingerprint(&[
                    author.as_deref().unwrap_or(""),
                    stable_time.as_deref().unwrap_or(""),
                    text_prefix,
                ]);
                format!("composite:{}", h)
            });

        let degenerate = if composite.is_some() {
            None
        } else if !has_author && !has_time && !text_prefix.is_empty() {
            Some((
                IdentityTier::Content,
                format!("content:{}", fingerprint(&[text_prefix])),
            ))
        } else if text_prefix.is_empty() && !raw.media_urls.is_empty() {
            let mut parts: Vec<&str> = vec![author.as_deref().unwrap_or("")];
            parts.extend(raw.media_urls.iter().map(String::as_str));
            Some((IdentityTier::Media, format!("media:{}", fingerprint(&parts))))
        } else {
            None
        };

        Self {
            permalink,
            composite,
            degenerate,
        }
    }

    /// The record's own key: the first qualifying tier.
    pub fn primary(&self) -> Option<(IdentityTier, &str)> {
        if let Some(p) = &self.permalink {
            return Some((IdentityTier::Permalink, p));
        }
        if let Some(c) = &self.composite {
            return Some((IdentityTier::Composite, c));
        }
        self.degenerate.as_ref().map(|(tier, k)| (*tier, k.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}
