use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One link found inside a post fragment (absolute href).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PostLink {
    pub href: String,
    pub text: String,
}

/// Timestamp as it appeared in the markup plus a best-effort parsed instant.
///
/// Feeds render times inconsistently ("2 h", "14 November at 10:23", ISO strings in
/// `datetime` attributes), so `raw` is always preserved and `parsed` is optional.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PostTimestamp {
    pub raw: String,
    #[serde(default)]
    pub parsed: Option<DateTime<Utc>>,
}

impl PostTimestamp {
    pub fn new(raw: impl Into<String>, parsed: Option<DateTime<Utc>>) -> Self {
        Self {
            raw: raw.into(),
            parsed,
        }
    }
}

/// Fields pulled out of one fragment before identity derivation.
///
/// Every field is optional or may be empty: a partially rendered post is still a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPost {
    pub author: Option<String>,
    pub timestamp: Option<PostTimestamp>,
    pub text: String,
    pub permalink: Option<String>,
    pub media_urls: Vec<String>,
    pub links: Vec<PostLink>,
}

impl RawPost {
    /// True when no strategy resolved anything for this fragment.
    pub fn is_empty(&self) -> bool {
        self.author.is_none()
            && self.timestamp.is_none()
            && self.text.is_empty()
            && self.permalink.is_none()
            && self.media_urls.is_empty()
    }
}

/// Which identity tier produced a record's key.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IdentityTier {
    Permalink,
    Composite,
    Content,
    Media,
}

impl IdentityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityTier::Permalink => "permalink",
            IdentityTier::Composite => "composite",
            IdentityTier::Content => "content",
            IdentityTier::Media => "media",
        }
    }

    /// Content and media keys are the degenerate tiers: no author, no timestamp.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, IdentityTier::Content | IdentityTier::Media)
    }
}

/// One logical feed entry in the session's ordered collection.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub identity_key: String,
    pub identity_tier: IdentityTier,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<PostTimestamp>,
    pub text: String,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub links: Vec<PostLink>,
    /// Scroll step of first capture. Diagnostics only; output order is insertion order.
    pub first_seen_step: usize,
    pub last_seen_step: usize,
    pub times_seen: usize,
}

/// Options chosen by the operator for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Case-insensitive substring tested against the normalized text. `None` accepts all.
    pub text_filter: Option<String>,
    pub auto_scroll: bool,
    /// `None` means scroll until patience runs out or the operator interrupts.
    pub max_steps: Option<usize>,
    /// Consecutive passes without a new record before stopping.
    pub patience: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            text_filter: None,
            auto_scroll: false,
            max_steps: Some(10),
            patience: 3,
        }
    }
}

impl RunOptions {
    /// Normalized, lower-cased filter needle; blank filters collapse to `None`.
    pub fn filter_needle(&self) -> Option<String> {
        self.text_filter
            .as_deref()
            .map(crate::scraping::feed_scraper::normalize::normalize_lower)
            .filter(|s| !s.is_empty())
    }
}
