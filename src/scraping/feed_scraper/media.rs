use super::normalize::resolve_href;
use aho_corasick::AhoCorasick;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Images declared smaller than this (either side) are icons, emoji or pixels.
const MIN_CONTENT_PX: u32 = 32;

// ── Decorative / tracking asset patterns ─────────────────────────────────────

const DECORATIVE_PATTERNS: &[&str] = &[
    "/emoji.php/",
    "/images/emoji/",
    "static.xx.fbcdn.net/rsrc.php",
    "/rsrc.php/",
    "spacer.gif",
    "blank.gif",
    "transparent.gif",
    "/tr?",
    "/tr/?",
    "facebook.com/tr",
    "pixel.gif",
    "/pixel?",
    "1x1.",
    "abs.twimg.com/emoji",
    "abs.twimg.com/hashflags",
    "/profile_images/",
];

static DECORATIVE_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn decorative_matcher() -> &'static AhoCorasick {
    DECORATIVE_MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(DECORATIVE_PATTERNS)
            .expect("valid decorative patterns")
    })
}

/// Returns `true` if this URL points at an icon, emoji sprite or tracking pixel.
pub fn is_decorative_url(url: &str) -> bool {
    decorative_matcher().is_match(url)
}

fn declared_px(el: &ElementRef<'_>, attr: &str) -> Option<u32> {
    let v = el.value().attr(attr)?.trim();
    let digits: String = v.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Size/role heuristic for `<img>`/`<video>` elements. Absent attributes never disqualify.
fn is_decorative_element(el: &ElementRef<'_>) -> bool {
    let tiny = |attr| declared_px(el, attr).is_some_and(|px| px < MIN_CONTENT_PX);
    if tiny("width") || tiny("height") {
        return true;
    }
    matches!(el.value().attr("role"), Some("presentation") | Some("none"))
        || el.value().attr("aria-hidden") == Some("true")
}

/// Last (largest, by convention) candidate of a `srcset` attribute.
fn srcset_last(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
        .filter(|s| !s.is_empty())
        .last()
}

/// Candidate URL strings for one media element, in preference order.
fn element_sources<'a>(el: &ElementRef<'a>) -> Vec<&'a str> {
    let v = el.value();
    let mut out = Vec::new();
    match v.name() {
        "img" => {
            if let Some(src) = v.attr("src").or_else(|| v.attr("data-src")) {
                out.push(src);
            } else if let Some(best) = v.attr("srcset").and_then(srcset_last) {
                out.push(best);
            }
        }
        "video" => {
            if let Some(src) = v.attr("src") {
                out.push(src);
            }
        }
        "source" => {
            if let Some(src) = v.attr("src") {
                out.push(src);
            } else if let Some(best) = v.attr("srcset").and_then(srcset_last) {
                out.push(best);
            }
        }
        _ => {}
    }
    out
}

fn media_selector() -> Option<&'static Selector> {
    static SEL: OnceLock<Option<Selector>> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("img, video, video source, picture source").ok())
        .as_ref()
}

/// Image and video URLs inside a fragment, absolute, deduplicated, first-seen order.
pub fn extract_media_urls(fragment: &ElementRef<'_>, base: Option<&Url>) -> Vec<String> {
    let Some(selector) = media_selector() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for el in fragment.select(selector) {
        if is_decorative_element(&el) {
            continue;
        }
        for raw in element_sources(&el) {
            let raw = raw.trim();
            if raw.is_empty() || raw.starts_with("data:") || raw.starts_with("blob:") {
                continue;
            }
            let Some(abs) = resolve_href(base, raw) else {
                continue;
            };
            let abs = abs.to_string();
            if is_decorative_url(&abs) {
                continue;
            }
            if seen.insert(abs.clone()) {
                urls.push(abs);
            }
        }
    }
    urls
}
