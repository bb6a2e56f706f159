//! Field extraction from one post fragment.
//!
//! Each field owns an ordered list of strategies. The first strategy that yields a usable
//! value wins; when none does the field stays absent. Nothing in here fails: partially
//! rendered posts simply come back with fewer fields.

use super::media::extract_media_urls;
use super::normalize::{normalize_lower, normalize_permalink, normalize_text, resolve_href};
use super::timestamp::{is_time_like, is_unix_stamp, parse_timestamp};
use super::ExtractContext;
use crate::types::{PostLink, PostTimestamp, RawPost};
use scraper::node::Node;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::trace;
use url::Url;

const MAX_LINKS: usize = 30;
const MAX_AUTHOR_CHARS: usize = 80;
const MAX_AUTHOR_WORDS: usize = 8;

/// Interface labels that sit in author/text positions but are never content.
const UI_LABELS: &[&str] = &[
    "like",
    "likes",
    "comment",
    "comments",
    "share",
    "shares",
    "shared",
    "reply",
    "replies",
    "send",
    "follow",
    "following",
    "join",
    "message",
    "see more",
    "see less",
    "see translation",
    "see original",
    "most relevant",
    "all reactions:",
    "write a comment…",
    "write a comment...",
    "view more comments",
    "author",
    "admin",
    "top contributor",
    "sponsored",
    "suggested for you",
];

/// Path/query fragments that mark a URL as the canonical address of one post.
const PERMALINK_MARKERS: &[&str] = &[
    "/posts/",
    "/permalink/",
    "permalink.php",
    "story_fbid=",
    "story.php",
    "multi_permalinks=",
    "/videos/",
    "/reel/",
    "/status/",
];

fn is_ui_label(s: &str) -> bool {
    let lower = s.to_lowercase();
    UI_LABELS.contains(&lower.as_str()) || lower.chars().all(|c| !c.is_alphanumeric())
}

pub fn looks_like_permalink(url: &Url) -> bool {
    let s = url.as_str();
    PERMALINK_MARKERS.iter().any(|m| s.contains(m))
}

/// Tags whose text never reaches the reader.
fn is_non_rendered_tag(name: &str) -> bool {
    matches!(
        name,
        "script" | "style" | "noscript" | "template" | "svg" | "head" | "iframe"
    )
}

/// Inline hints that an element is not displayed.
fn is_hidden_element(el: &scraper::node::Element) -> bool {
    if is_non_rendered_tag(el.name()) {
        return true;
    }
    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}

/// True when `el` or any ancestor up to (and including) `fragment` is hidden.
fn within_hidden(el: &ElementRef<'_>, fragment: &ElementRef<'_>) -> bool {
    if is_hidden_element(el.value()) {
        return true;
    }
    for ancestor in el.ancestors() {
        if let Some(a) = ElementRef::wrap(ancestor) {
            if is_hidden_element(a.value()) {
                return true;
            }
            if a.id() == fragment.id() {
                break;
            }
        }
    }
    false
}

/// Visible text nodes of `root` in document order, each paired with its parent element.
pub fn visible_text_nodes<'a>(root: ElementRef<'a>) -> Vec<(&'a str, ElementRef<'a>)> {
    fn walk<'a>(el: ElementRef<'a>, out: &mut Vec<(&'a str, ElementRef<'a>)>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => {
                    let s: &'a str = t;
                    if !s.trim().is_empty() {
                        out.push((s, el));
                    }
                }
                Node::Element(e) if is_hidden_element(e) => {}
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        walk(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    let mut out = Vec::new();
    if !is_hidden_element(root.value()) {
        walk(root, &mut out);
    }
    out
}

/// Visible text of an element, normalized.
pub fn visible_text(root: ElementRef<'_>) -> String {
    let joined = visible_text_nodes(root)
        .into_iter()
        .map(|(t, _)| t)
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined)
}

/// A timestamp candidate plus the element it came from.
#[derive(Debug, Clone)]
pub struct TimestampHit<'a> {
    pub raw: String,
    pub node: ElementRef<'a>,
}

type AuthorStrategy = fn(&FieldExtractor, &ElementRef<'_>) -> Option<String>;
type TimestampStrategy = for<'a> fn(&FieldExtractor, &ElementRef<'a>) -> Option<TimestampHit<'a>>;
type TextStrategy = fn(&FieldExtractor, &ElementRef<'_>, &FieldHints) -> Option<String>;
type PermalinkStrategy =
    fn(&FieldExtractor, &ElementRef<'_>, &ExtractContext, Option<&TimestampHit<'_>>) -> Option<String>;

/// Already-resolved fields later strategies use to tell header text from body text.
#[derive(Debug, Default)]
pub struct FieldHints {
    pub author: Option<String>,
    pub timestamp_raw: Option<String>,
}

fn compile(selectors: &str) -> Option<Selector> {
    Selector::parse(selectors).ok()
}

/// Per-field extraction strategies over a fragment.
pub struct FieldExtractor {
    heading_links: Option<Selector>,
    headings: Option<Selector>,
    role_links: Option<Selector>,
    auto_dir_spans: Option<Selector>,
    time_elements: Option<Selector>,
    utime: Option<Selector>,
    abbr_titled: Option<Selector>,
    aria_labelled: Option<Selector>,
    message_bodies: Option<Selector>,
    anchors: Option<Selector>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor {
    pub const AUTHOR_STRATEGIES: &'static [(&'static str, AuthorStrategy)] = &[
        ("heading_link", Self::author_from_heading_links),
        ("heading", Self::author_from_headings),
        ("role_link", Self::author_from_role_links),
        ("auto_dir_span", Self::author_from_auto_dir_spans),
    ];

    pub const TIMESTAMP_STRATEGIES: &'static [(&'static str, TimestampStrategy)] = &[
        ("time_element", Self::timestamp_from_time_element),
        ("utime_attr", Self::timestamp_from_utime),
        ("abbr_title", Self::timestamp_from_abbr),
        ("aria_label", Self::timestamp_from_aria_label),
        ("text_node", Self::timestamp_from_text_nodes),
    ];

    pub const TEXT_STRATEGIES: &'static [(&'static str, TextStrategy)] = &[
        ("message_body", Self::text_from_message_body),
        ("visible_text", Self::text_from_visible_body),
    ];

    pub const PERMALINK_STRATEGIES: &'static [(&'static str, PermalinkStrategy)] = &[
        ("permalink_shape", Self::permalink_from_shape),
        ("timestamp_anchor", Self::permalink_from_timestamp_anchor),
    ];

    pub fn new() -> Self {
        Self {
            heading_links: compile(
                "h1 a, h2 a, h3 a, h4 a, strong a, [data-testid='User-Name'] a",
            ),
            headings: compile("h2, h3, h4, strong"),
            role_links: compile("a[role='link']"),
            auto_dir_spans: compile("span[dir='auto']"),
            time_elements: compile("time"),
            utime: compile("[data-utime]"),
            abbr_titled: compile("abbr[title], abbr[aria-label]"),
            aria_labelled: compile("a[aria-label], span[aria-label]"),
            message_bodies: compile(
                "[data-ad-preview='message'], [data-ad-comet-preview='message'], \
                 [data-testid='post_message'], [data-testid='tweetText']",
            ),
            anchors: compile("a[href]"),
        }
    }

    /// Extract every field of one fragment.
    pub fn extract(&self, fragment: &ElementRef<'_>, ctx: &ExtractContext) -> RawPost {
        let author = self.author(fragment);
        let ts_hit = self.timestamp_hit(fragment);
        let hints = FieldHints {
            author: author.clone(),
            timestamp_raw: ts_hit.as_ref().map(|h| h.raw.clone()),
        };
        let text = self.text(fragment, &hints);
        let permalink = self.permalink(fragment, ctx, ts_hit.as_ref());
        let timestamp = ts_hit.map(|h| {
            let parsed = parse_timestamp(&h.raw, ctx.reference_time);
            PostTimestamp::new(h.raw, parsed)
        });

        RawPost {
            author,
            timestamp,
            text,
            permalink,
            media_urls: extract_media_urls(fragment, ctx.base_url.as_ref()),
            links: self.links(fragment, ctx),
        }
    }

    // ── author ───────────────────────────────────────────────────────────────

    pub fn author(&self, fragment: &ElementRef<'_>) -> Option<String> {
        for (name, strategy) in Self::AUTHOR_STRATEGIES {
            if let Some(a) = strategy(self, fragment) {
                trace!("author resolved by {}", name);
                return Some(a);
            }
        }
        None
    }

    fn clean_author(candidate: &str) -> Option<String> {
        let a = normalize_text(candidate);
        let chars = a.chars().count();
        if chars < 2 || chars > MAX_AUTHOR_CHARS {
            return None;
        }
        if a.split_whitespace().count() > MAX_AUTHOR_WORDS || is_ui_label(&a) || is_time_like(&a)
        {
            return None;
        }
        Some(a)
    }

    fn first_author_in(
        fragment: &ElementRef<'_>,
        selector: &Option<Selector>,
    ) -> Option<String> {
        let sel = selector.as_ref()?;
        fragment
            .select(sel)
            .filter(|el| !within_hidden(el, fragment))
            .find_map(|el| Self::clean_author(&visible_text(el)))
    }

    fn author_from_heading_links(&self, fragment: &ElementRef<'_>) -> Option<String> {
        Self::first_author_in(fragment, &self.heading_links)
    }

    fn author_from_headings(&self, fragment: &ElementRef<'_>) -> Option<String> {
        Self::first_author_in(fragment, &self.headings)
    }

    fn author_from_role_links(&self, fragment: &ElementRef<'_>) -> Option<String> {
        Self::first_author_in(fragment, &self.role_links)
    }

    fn author_from_auto_dir_spans(&self, fragment: &ElementRef<'_>) -> Option<String> {
        Self::first_author_in(fragment, &self.auto_dir_spans)
    }

    // ── timestamp ────────────────────────────────────────────────────────────

    pub fn timestamp_hit<'a>(&self, fragment: &ElementRef<'a>) -> Option<TimestampHit<'a>> {
        for (name, strategy) in Self::TIMESTAMP_STRATEGIES {
            if let Some(hit) = strategy(self, fragment) {
                trace!("timestamp resolved by {}: {}", name, hit.raw);
                return Some(hit);
            }
        }
        None
    }

    fn timestamp_from_time_element<'a>(
        &self,
        fragment: &ElementRef<'a>,
    ) -> Option<TimestampHit<'a>> {
        let sel = self.time_elements.as_ref()?;
        fragment.select(sel).find_map(|el| {
            let raw = el
                .value()
                .attr("datetime")
                .map(normalize_text)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| visible_text(el));
            (!raw.is_empty()).then_some(TimestampHit { raw, node: el })
        })
    }

    fn timestamp_from_utime<'a>(&self, fragment: &ElementRef<'a>) -> Option<TimestampHit<'a>> {
        let sel = self.utime.as_ref()?;
        fragment.select(sel).find_map(|el| {
            let raw = normalize_text(el.value().attr("data-utime")?);
            (is_unix_stamp(&raw) || is_time_like(&raw)).then_some(TimestampHit { raw, node: el })
        })
    }

    fn timestamp_from_abbr<'a>(&self, fragment: &ElementRef<'a>) -> Option<TimestampHit<'a>> {
        let sel = self.abbr_titled.as_ref()?;
        fragment.select(sel).find_map(|el| {
            let v = el.value();
            let raw = normalize_text(v.attr("title").or_else(|| v.attr("aria-label"))?);
            (!raw.is_empty()).then_some(TimestampHit { raw, node: el })
        })
    }

    fn timestamp_from_aria_label<'a>(
        &self,
        fragment: &ElementRef<'a>,
    ) -> Option<TimestampHit<'a>> {
        let sel = self.aria_labelled.as_ref()?;
        fragment.select(sel).find_map(|el| {
            let raw = normalize_text(el.value().attr("aria-label")?);
            is_time_like(&raw).then_some(TimestampHit { raw, node: el })
        })
    }

    fn timestamp_from_text_nodes<'a>(
        &self,
        fragment: &ElementRef<'a>,
    ) -> Option<TimestampHit<'a>> {
        visible_text_nodes(*fragment)
            .into_iter()
            .find_map(|(t, parent)| {
                let raw = normalize_text(t);
                is_time_like(&raw).then_some(TimestampHit { raw, node: parent })
            })
    }

    // ── text ─────────────────────────────────────────────────────────────────

    pub fn text(&self, fragment: &ElementRef<'_>, hints: &FieldHints) -> String {
        for (name, strategy) in Self::TEXT_STRATEGIES {
            if let Some(t) = strategy(self, fragment, hints) {
                trace!("text resolved by {} ({} chars)", name, t.len());
                return t;
            }
        }
        String::new()
    }

    fn text_from_message_body(
        &self,
        fragment: &ElementRef<'_>,
        _hints: &FieldHints,
    ) -> Option<String> {
        let sel = self.message_bodies.as_ref()?;
        fragment
            .select(sel)
            .map(visible_text)
            .find(|t| !t.is_empty())
    }

    /// Whole visible text minus header bits (author, time strings, interface labels),
    /// so the body stays the same while relative times tick forward.
    fn text_from_visible_body(
        &self,
        fragment: &ElementRef<'_>,
        hints: &FieldHints,
    ) -> Option<String> {
        let author = hints.author.as_deref().map(normalize_lower);
        let mut parts: Vec<String> = Vec::new();
        for (t, _) in visible_text_nodes(*fragment) {
            let piece = normalize_text(t);
            if piece.is_empty() || is_ui_label(&piece) || is_time_like(&piece) {
                continue;
            }
            if author.as_deref() == Some(piece.to_lowercase().as_str()) {
                continue;
            }
            parts.push(piece);
        }
        let text = normalize_text(&parts.join(" "));
        (!text.is_empty()).then_some(text)
    }

    // ── permalink ────────────────────────────────────────────────────────────

    pub fn permalink(
        &self,
        fragment: &ElementRef<'_>,
        ctx: &ExtractContext,
        ts_hit: Option<&TimestampHit<'_>>,
    ) -> Option<String> {
        for (name, strategy) in Self::PERMALINK_STRATEGIES {
            if let Some(p) = strategy(self, fragment, ctx, ts_hit) {
                trace!("permalink resolved by {}: {}", name, p);
                return Some(p);
            }
        }
        None
    }

    fn permalink_from_shape(
        &self,
        fragment: &ElementRef<'_>,
        ctx: &ExtractContext,
        _ts_hit: Option<&TimestampHit<'_>>,
    ) -> Option<String> {
        let sel = self.anchors.as_ref()?;
        fragment
            .select(sel)
            .filter_map(|a| resolve_href(ctx.base_url.as_ref(), a.value().attr("href")?))
            .find(looks_like_permalink)
            .map(|u| normalize_permalink(&u))
    }

    /// The anchor wrapping the timestamp usually points at the post itself.
    fn permalink_from_timestamp_anchor(
        &self,
        fragment: &ElementRef<'_>,
        ctx: &ExtractContext,
        ts_hit: Option<&TimestampHit<'_>>,
    ) -> Option<String> {
        let hit = ts_hit?;
        let anchor = std::iter::once(hit.node)
            .chain(
                hit.node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .take_while(|a| a.id() != fragment.id()),
            )
            .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())?;
        let url = resolve_href(ctx.base_url.as_ref(), anchor.value().attr("href")?)?;
        // a bare feed/profile root is not a post address
        if url.path().trim_matches('/').is_empty() {
            return None;
        }
        Some(normalize_permalink(&url))
    }

    // ── links ────────────────────────────────────────────────────────────────

    pub fn links(&self, fragment: &ElementRef<'_>, ctx: &ExtractContext) -> Vec<PostLink> {
        let Some(sel) = self.anchors.as_ref() else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for a in fragment.select(sel) {
            let Some(url) = a
                .value()
                .attr("href")
                .and_then(|h| resolve_href(ctx.base_url.as_ref(), h))
            else {
                continue;
            };
            let href = url.to_string();
            if !seen.insert(href.clone()) {
                continue;
            }
            out.push(PostLink {
                href,
                text: visible_text(a),
            });
            if out.len() >= MAX_LINKS {
                break;
            }
        }
        out
    }
}
