#![allow(dead_code)]

use async_trait::async_trait;
use feed_scout::snapshot::{SnapshotError, SnapshotSource};

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One Facebook-style post container.
pub fn post(author: Option<&str>, ts: &str, text: &str, permalink: Option<&str>) -> String {
    let header = author
        .map(|a| format!(r#"<h3><a href="/profile/{0}?__cft__[0]=AZ">{1}</a></h3>"#, a.replace(' ', "."), a))
        .unwrap_or_default();
    let time = match permalink {
        Some(href) => format!(r#"<a href="{href}"><span>{ts}</span></a>"#),
        None => format!("<span>{ts}</span>"),
    };
    format!(
        r#"<div role="article">{header}{time}<div data-ad-preview="message"><div dir="auto">{text}</div></div><span>Like</span><span>Comment</span></div>"#
    )
}

pub fn page(posts: &[String]) -> String {
    format!(
        r#"<html><body><div role="main"><div class="feed">{}</div></div></body></html>"#,
        posts.join("\n")
    )
}

/// Serves one snapshot per pass; pass `n` sees `snapshots[n - 1]` (the last one repeats).
pub struct ScriptedSource {
    pub snapshots: Vec<String>,
    pub scrolls: usize,
    pub reads: usize,
    /// Scroll step at which the browser "goes away".
    pub lose_session_at: Option<usize>,
    /// Scroll step at which the page refuses to scroll.
    pub fail_scroll_at: Option<usize>,
    pub url: Option<String>,
}

impl ScriptedSource {
    pub fn new(snapshots: Vec<String>) -> Self {
        Self {
            snapshots,
            scrolls: 0,
            reads: 0,
            lose_session_at: None,
            fail_scroll_at: None,
            url: Some("https://www.facebook.com/groups/gardeners/".to_string()),
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn get_markup(&mut self) -> Result<String, SnapshotError> {
        self.reads += 1;
        let idx = self.reads.saturating_sub(1).min(self.snapshots.len().saturating_sub(1));
        self.snapshots
            .get(idx)
            .cloned()
            .ok_or_else(|| SnapshotError::SessionLost("no snapshot scripted".into()))
    }

    async fn scroll_and_wait(&mut self, step: usize) -> Result<(), SnapshotError> {
        if self.lose_session_at == Some(step) {
            return Err(SnapshotError::SessionLost("target closed".into()));
        }
        if self.fail_scroll_at.is_some_and(|at| step >= at) {
            return Err(SnapshotError::ScrollFailed(format!("step {step}: evaluate rejected")));
        }
        self.scrolls += 1;
        Ok(())
    }

    async fn page_url(&mut self) -> Result<Option<String>, SnapshotError> {
        Ok(self.url.clone())
    }
}
