//! Text and URL normalization shared by the extractor, identity derivation and the report.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Zero-width and bidi-formatting characters feeds sprinkle into names and bodies.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{061C}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{2069}'
            | '\u{FEFF}'
    )
}

/// Decode HTML entities, drop invisible formatting characters, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let decoded = html_escape::decode_html_entities(s);
    let visible: String = decoded.chars().filter(|c| !is_invisible(*c)).collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_lower(s: &str) -> String {
    normalize_text(s).to_lowercase()
}

/// First `n` characters (not bytes) of a string.
pub fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Resolve `href` against `base`, skipping in-page anchors and script/mail pseudo-links.
pub fn resolve_href(base: Option<&Url>, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let resolved = match base {
        Some(b) => b.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Query parameters that only carry click tracking and change between renders.
fn is_tracking_param(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    n.starts_with("__cft__")
        || n.starts_with("__xts__")
        || n.starts_with("utm_")
        || matches!(
            n.as_str(),
            "__tn__"
                | "__eep__"
                | "ref"
                | "fref"
                | "refid"
                | "hc_ref"
                | "hc_location"
                | "paipv"
                | "eav"
                | "rdid"
                | "share_url"
                | "mibextid"
                | "s"
                | "t"
                | "comment_tracking"
                | "notif_id"
                | "notif_t"
                | "acontext"
                | "sfnsn"
                | "extid"
        )
}

/// Canonical form of a post URL used both for display and identity.
///
/// Host is lower-cased with mobile/`www` prefixes removed, fragment and tracking
/// parameters dropped, the remaining query sorted and any trailing slash trimmed.
pub fn normalize_permalink(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);

    if let Some(host) = u.host_str().map(|h| h.to_ascii_lowercase()) {
        let stripped = ["www.", "m.", "mbasic.", "web.", "mobile."]
            .iter()
            .find_map(|p| host.strip_prefix(p))
            .unwrap_or(&host)
            .to_string();
        if stripped != host {
            let _ = u.set_host(Some(&stripped));
        }
    }

    let mut kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort();
    if kept.is_empty() {
        u.set_query(None);
    } else {
        u.query_pairs_mut().clear().extend_pairs(kept.iter());
    }

    let path = u.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        u.set_path(path.trim_end_matches('/'));
    }

    u.to_string()
}

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid slug pattern"))
}

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://").expect("valid scheme pattern"))
}

/// Filesystem-safe slug for a page URL.
///
/// `https://www.facebook.com/GroupName/?id=123` → `www_facebook_com_GroupName_id_123`
pub fn slugify_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return "page".to_string();
    }
    let no_scheme = scheme_re().replace(url, "");
    let slug = slug_re().replace_all(&no_scheme, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}

/// Report folder name: slug with the Facebook host prefix removed.
pub fn report_slug(url: &str) -> String {
    let slug = slugify_url(url);
    match slug.strip_prefix("www_facebook_com_") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_collapses_and_strips() {
        let raw = "  Hello\u{200B}  \n\n world&nbsp;&amp; \u{202A}friends\u{202C}\t ";
        assert_eq!(normalize_text(raw), "Hello world & friends");
    }

    #[test]
    fn test_normalize_lower() {
        assert_eq!(normalize_lower("  GARDEN\u{200E} Party "), "garden party");
    }

    #[test]
    fn test_char_prefix_is_char_safe() {
        assert_eq!(char_prefix("héllo wörld", 4), "héll");
        assert_eq!(char_prefix("ab", 10), "ab");
    }

    #[test]
    fn test_resolve_href_skips_pseudo_links() {
        let base = Url::parse("https://www.facebook.com/groups/1/").unwrap();
        assert!(resolve_href(Some(&base), "#").is_none());
        assert!(resolve_href(Some(&base), "javascript:void(0)").is_none());
        assert_eq!(
            resolve_href(Some(&base), "/story.php?id=3").unwrap().as_str(),
            "https://www.facebook.com/story.php?id=3"
        );
        assert!(resolve_href(None, "/relative").is_none());
    }

    #[test]
    fn test_normalize_permalink_drops_tracking() {
        let a = Url::parse(
            "https://www.facebook.com/groups/1/posts/42/?__cft__[0]=AZX&__tn__=%2CO%2CP-R#x",
        )
        .unwrap();
        let b = Url::parse("https://m.facebook.com/groups/1/posts/42").unwrap();
        assert_eq!(normalize_permalink(&a), "https://facebook.com/groups/1/posts/42");
        assert_eq!(normalize_permalink(&a), normalize_permalink(&b));
    }

    #[test]
    fn test_normalize_permalink_keeps_identifying_params_sorted() {
        let u = Url::parse("https://www.facebook.com/permalink.php?story_fbid=9&id=7&ref=nf")
            .unwrap();
        assert_eq!(
            normalize_permalink(&u),
            "https://facebook.com/permalink.php?id=7&story_fbid=9"
        );
    }

    #[test]
    fn test_slugify_url() {
        assert_eq!(
            slugify_url("https://www.facebook.com/GroupName/?id=123"),
            "www_facebook_com_GroupName_id_123"
        );
        assert_eq!(slugify_url(""), "page");
        assert_eq!(slugify_url("https://"), "page");
        assert_eq!(
            report_slug("https://www.facebook.com/GroupName/"),
            "GroupName"
        );
        assert_eq!(report_slug("https://example.org/feed"), "example_org_feed");
    }
}
