//! Attaching to an already running Chromium over the DevTools protocol.
//!
//! The operator starts the browser themselves (logged in, on the feed) with
//! `--remote-debugging-port`. Nothing here launches, navigates or closes it: we discover
//! the websocket endpoint, pick a tab, then only read markup and scroll.

use super::snapshot::{SnapshotError, SnapshotSource};
use crate::core::config::ScoutConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Schemes of tabs that are never the feed.
const INTERNAL_TAB_PREFIXES: &[&str] = &[
    "devtools://",
    "chrome://",
    "chrome-extension://",
    "brave://",
    "edge://",
    "about:",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdpOptions {
    /// Remote-debugging HTTP endpoint, e.g. `http://127.0.0.1:9222`.
    pub endpoint: String,
    /// Substring of the tab URL to attach to; first content tab otherwise.
    pub tab_hint: Option<String>,
    pub scroll_px: u32,
    pub settle_ms: u64,
    pub idle_quiet_ms: u64,
    pub idle_timeout_ms: u64,
}

impl CdpOptions {
    pub fn from_config(cfg: &ScoutConfig) -> Self {
        Self {
            endpoint: cfg.resolve_cdp_endpoint(),
            tab_hint: None,
            scroll_px: cfg.resolve_scroll_px(),
            settle_ms: cfg.resolve_settle_ms(),
            idle_quiet_ms: cfg.resolve_idle_quiet_ms(),
            idle_timeout_ms: cfg.resolve_idle_timeout_ms(),
        }
    }
}

/// Ask the browser for its websocket debugger URL via `/json/version`.
///
/// Retried with exponential backoff: right after the operator starts the browser the
/// port may not be listening yet.
pub async fn discover_ws_url(endpoint: &str) -> Result<String> {
    let json_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;
    let client = &client;
    let json_url = json_url.as_str();

    retry(
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(8)))
            .build(),
        || async move {
            let response = client.get(json_url).send().await.map_err(|e| {
                debug!("CDP discovery at {} failed: {}", json_url, e);
                backoff::Error::transient(anyhow!("HTTP request to {} failed: {}", json_url, e))
            })?;
            let json: serde_json::Value = response.json().await.map_err(|e| {
                backoff::Error::permanent(anyhow!("JSON parse failed: {}", e))
            })?;
            ws_url_from_version(&json).ok_or_else(|| {
                backoff::Error::permanent(anyhow!("No webSocketDebuggerUrl in response"))
            })
        },
    )
    .await
}

fn ws_url_from_version(json: &serde_json::Value) -> Option<String> {
    json["webSocketDebuggerUrl"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_content_tab(url: &str) -> bool {
    !url.is_empty() && !INTERNAL_TAB_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// Index of the tab to attach to: first content tab whose URL contains `hint`, else the
/// first content tab.
pub fn choose_tab(urls: &[Option<String>], hint: Option<&str>) -> Option<usize> {
    let content = |i: &usize| urls[*i].as_deref().is_some_and(is_content_tab);
    let hint = hint.map(str::trim).filter(|h| !h.is_empty());
    if let Some(h) = hint {
        if let Some(i) = (0..urls.len())
            .filter(content)
            .find(|i| urls[*i].as_deref().is_some_and(|u| u.contains(h)))
        {
            return Some(i);
        }
        warn!("no tab matches '{}', falling back to the first content tab", h);
    }
    (0..urls.len()).find(content)
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

/// A feed tab in the operator's browser.
pub struct CdpSnapshotSource {
    // Held so the connection stays open; never closed by us.
    _browser: Browser,
    page: Page,
    closed: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
    opts: CdpOptions,
}

impl CdpSnapshotSource {
    pub async fn attach(opts: CdpOptions) -> Result<Self> {
        let ws_url = discover_ws_url(&opts.endpoint).await.map_err(|e| {
            anyhow!(
                "Could not reach the browser at {} ({}). Start it with --remote-debugging-port and try again.",
                opts.endpoint,
                e
            )
        })?;
        info!("discovered CDP endpoint: {}", ws_url);

        let (mut browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| anyhow!("Browser connect failed: {}", e))?;
        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        // Existing tabs only show up in `pages()` once their targets are attached.
        browser
            .fetch_targets()
            .await
            .map_err(|e| anyhow!("Failed to list browser targets: {}", e))?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let pages = browser
            .pages()
            .await
            .map_err(|e| anyhow!("Failed to list open tabs: {}", e))?;
        let mut urls = Vec::with_capacity(pages.len());
        for p in &pages {
            urls.push(p.url().await.ok().flatten());
        }
        let idx = choose_tab(&urls, opts.tab_hint.as_deref())
            .ok_or_else(|| anyhow!("No open tab to attach to. Open the feed in the browser first."))?;
        let page = pages
            .into_iter()
            .nth(idx)
            .ok_or_else(|| anyhow!("Selected tab disappeared"))?;
        info!(
            "attached to tab: {}",
            urls[idx].as_deref().unwrap_or("<unknown>")
        );

        Ok(Self {
            _browser: browser,
            page,
            closed,
            handler_task,
            opts,
        })
    }

    fn session_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn lost(&self, what: &str, e: impl std::fmt::Display) -> SnapshotError {
        SnapshotError::SessionLost(format!("{}: {}", what, e))
    }

    /// Stop listening to the browser. The browser and its tabs stay open.
    pub fn detach(self) {
        self.handler_task.abort();
    }

    /// Wait until the page stops fetching resources (no new resource entries for
    /// `quiet_ms`) or `timeout_ms` elapses.
    ///
    /// Polls `performance.getEntriesByType("resource").length`, the same networkidle
    /// heuristic Playwright uses, without needing CDP network events.
    async fn wait_until_stable(&self, quiet_ms: u64, timeout_ms: u64) -> Result<(), SnapshotError> {
        let poll_ms = 250u64;
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if !self.session_alive() {
                return Err(SnapshotError::SessionLost(
                    "browser connection closed while waiting for the page".to_string(),
                ));
            }
            if start.elapsed().as_millis() as u64 >= timeout_ms {
                debug!("wait_until_stable: timeout after {}ms", timeout_ms);
                break;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
                debug!(
                    "wait_until_stable: idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for CdpSnapshotSource {
    async fn get_markup(&mut self) -> Result<String, SnapshotError> {
        if !self.session_alive() {
            return Err(SnapshotError::SessionLost(
                "browser connection closed".to_string(),
            ));
        }
        self.page
            .content()
            .await
            .map_err(|e| self.lost("failed to read page content", e))
    }

    async fn scroll_and_wait(&mut self, step: usize) -> Result<(), SnapshotError> {
        let script = format!("window.scrollBy(0, {});", self.opts.scroll_px);
        // A closed tab fails here while the websocket stays up; both cases end the run.
        if let Err(e) = self.page.evaluate(script).await {
            return Err(if self.session_alive() {
                SnapshotError::ScrollFailed(format!("step {}: {}", step, e))
            } else {
                self.lost("browser connection closed during scroll", e)
            });
        }
        tokio::time::sleep(Duration::from_millis(self.opts.settle_ms)).await;
        self.wait_until_stable(self.opts.idle_quiet_ms, self.opts.idle_timeout_ms)
            .await
    }

    async fn page_url(&mut self) -> Result<Option<String>, SnapshotError> {
        self.page
            .url()
            .await
            .map_err(|e| self.lost("failed to read page url", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(v: &[&str]) -> Vec<Option<String>> {
        v.iter()
            .map(|s| (!s.is_empty()).then(|| s.to_string()))
            .collect()
    }

    #[test]
    fn test_choose_tab_skips_internal_pages() {
        let tabs = urls(&[
            "chrome://newtab/",
            "devtools://devtools/bundled/inspector.html",
            "https://www.facebook.com/groups/gardeners",
        ]);
        assert_eq!(choose_tab(&tabs, None), Some(2));
    }

    #[test]
    fn test_choose_tab_prefers_hint_and_falls_back() {
        let tabs = urls(&[
            "https://news.example.com/",
            "",
            "https://www.facebook.com/groups/gardeners",
        ]);
        assert_eq!(choose_tab(&tabs, Some("facebook.com/groups")), Some(2));
        assert_eq!(choose_tab(&tabs, Some("twitter.com")), Some(0));
        assert_eq!(choose_tab(&urls(&["about:blank"]), None), None);
    }

    #[test]
    fn test_ws_url_from_version() {
        let json = serde_json::json!({
            "Browser": "Chrome/131.0.0.0",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
        });
        assert_eq!(
            ws_url_from_version(&json).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert!(ws_url_from_version(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_options_from_config() {
        let cfg = crate::core::config::parse_scout_config(
            r#"{"cdp_endpoint": "http://localhost:9333", "scroll_px": 700}"#,
        )
        .unwrap();
        let opts = CdpOptions::from_config(&cfg);
        assert_eq!(opts.endpoint, "http://localhost:9333");
        assert_eq!(opts.scroll_px, 700);
        assert!(opts.tab_hint.is_none());
    }
}
