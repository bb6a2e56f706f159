//! Splitting a rendered snapshot into candidate post containers.

use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Container selectors tried against every snapshot.
pub const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    "div[role='article']",
    "div[data-pagelet*='FeedUnit']",
    "li[role='listitem']",
];

/// Below this many containers the repeated-class fallback kicks in.
const MIN_CONTAINERS: usize = 5;
/// A `div` class string must repeat this often to look like a list item.
const MIN_CLASS_REPEATS: usize = 5;
const MAX_FALLBACK_FRAGMENTS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOrigin {
    /// Matched one of the container selectors.
    Container,
    /// Found by the repeated-class heuristic.
    RepeatedClass,
}

/// One candidate post container inside a parsed snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub ordinal: usize,
    pub element: ElementRef<'a>,
    pub origin: FragmentOrigin,
}

pub struct Segmenter {
    containers: Option<Selector>,
    roots: Vec<Selector>,
    classed_divs: Option<Selector>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            containers: Selector::parse(&CONTAINER_SELECTORS.join(", ")).ok(),
            roots: ["main", "[role='main']", "body"]
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
            classed_divs: Selector::parse("div[class]").ok(),
        }
    }

    /// Fragments of `doc` in document order. Nested containers collapse into their
    /// outermost ancestor so a post segments the same way whatever wraps it.
    pub fn segment<'a>(&self, doc: &'a Html) -> impl Iterator<Item = Fragment<'a>> + 'a {
        let containers: Vec<ElementRef<'a>> = match &self.containers {
            Some(sel) => doc.select(sel).collect(),
            None => Vec::new(),
        };
        let container_ids: HashSet<_> = containers.iter().map(|e| e.id()).collect();
        let outermost: Vec<ElementRef<'a>> = containers
            .into_iter()
            .filter(|e| !e.ancestors().any(|a| container_ids.contains(&a.id())))
            .collect();

        let mut chosen: HashMap<_, FragmentOrigin> = outermost
            .iter()
            .map(|e| (e.id(), FragmentOrigin::Container))
            .collect();

        if outermost.len() < MIN_CONTAINERS {
            let overlaps_container = |d: &ElementRef<'a>| {
                d.ancestors().any(|a| container_ids.contains(&a.id()))
                    || d.descendants().any(|n| container_ids.contains(&n.id()))
            };
            let extra = self.repeated_class_fallback(doc, overlaps_container);
            debug!(
                "segmenter: {} containers, repeated-class fallback added {}",
                outermost.len(),
                extra.len()
            );
            for e in extra {
                chosen.entry(e.id()).or_insert(FragmentOrigin::RepeatedClass);
            }
        }

        doc.root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter_map(move |e| chosen.get(&e.id()).map(|origin| (e, *origin)))
            .enumerate()
            .map(|(ordinal, (element, origin))| Fragment {
                ordinal,
                element,
                origin,
            })
    }

    /// `div`s under the main region whose exact class string repeats often enough to
    /// look like feed items. Outermost only, never overlapping a real container.
    fn repeated_class_fallback<'a>(
        &self,
        doc: &'a Html,
        overlaps_container: impl Fn(&ElementRef<'a>) -> bool,
    ) -> Vec<ElementRef<'a>> {
        let Some(div_sel) = &self.classed_divs else {
            return Vec::new();
        };
        let root = self
            .roots
            .iter()
            .find_map(|sel| doc.select(sel).next())
            .unwrap_or_else(|| doc.root_element());

        let divs: Vec<ElementRef<'a>> = root.select(div_sel).collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for d in &divs {
            if let Some(cls) = d.value().attr("class").map(str::trim).filter(|c| !c.is_empty()) {
                *counts.entry(cls).or_default() += 1;
            }
        }

        let frequent: Vec<ElementRef<'a>> = divs
            .into_iter()
            .filter(|d| {
                d.value()
                    .attr("class")
                    .map(str::trim)
                    .and_then(|c| counts.get(c))
                    .is_some_and(|n| *n >= MIN_CLASS_REPEATS)
            })
            .filter(|d| !overlaps_container(d))
            .collect();

        let frequent_ids: HashSet<_> = frequent.iter().map(|e| e.id()).collect();
        frequent
            .into_iter()
            .filter(|d| !d.ancestors().any(|a| frequent_ids.contains(&a.id())))
            .take(MAX_FALLBACK_FRAGMENTS)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(doc: &Html) -> Vec<String> {
        Segmenter::new()
            .segment(doc)
            .map(|f| f.element.text().collect::<String>().trim().to_string())
            .collect()
    }

    #[test]
    fn test_nested_articles_collapse_to_outermost() {
        let doc = Html::parse_document(
            r#"<main>
                <div role="article">Post one
                    <div role="article">a comment</div>
                </div>
                <article>Post two</article>
            </main>"#,
        );
        let frags: Vec<_> = Segmenter::new().segment(&doc).collect();
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].ordinal, 0);
        assert_eq!(frags[1].ordinal, 1);
        assert!(frags
            .iter()
            .all(|f| f.origin == FragmentOrigin::Container));
        assert!(texts(&doc)[0].starts_with("Post one"));
    }

    #[test]
    fn test_wrapper_markup_does_not_change_fragment() {
        let a = Html::parse_document(r#"<div><article><p>Hello</p></article></div>"#);
        let b = Html::parse_document(
            r#"<section class="x"><div class="y"><article><p>Hello</p></article></div></section>"#,
        );
        let fa: Vec<_> = Segmenter::new().segment(&a).map(|f| f.element.html()).collect();
        let fb: Vec<_> = Segmenter::new().segment(&b).map(|f| f.element.html()).collect();
        assert_eq!(fa, fb);
    }

    #[test]
    fn test_repeated_class_fallback() {
        let items: String = (0..6)
            .map(|i| format!(r#"<div class="item card"><span>entry {i}</span></div>"#))
            .collect();
        let html = format!(r#"<body><main><div class="list">{items}</div></main></body>"#);
        let doc = Html::parse_document(&html);
        let frags: Vec<_> = Segmenter::new().segment(&doc).collect();
        assert_eq!(frags.len(), 6);
        assert!(frags
            .iter()
            .all(|f| f.origin == FragmentOrigin::RepeatedClass));
    }

    #[test]
    fn test_empty_and_malformed_markup_never_fails() {
        assert_eq!(Segmenter::new().segment(&Html::parse_document("")).count(), 0);
        let doc = Html::parse_document("<article><div><p>unterminated");
        assert_eq!(Segmenter::new().segment(&doc).count(), 1);
    }
}
