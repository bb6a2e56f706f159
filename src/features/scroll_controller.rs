//! The scroll → extract → decide loop.
//!
//! `Idle → Scrolling → Extracting → Deciding → (Scrolling | Done)`. One pass is one
//! scroll cycle followed by one snapshot; passes never overlap and the session is only
//! touched from inside the loop.

use super::session::{MergeOutcome, SessionState};
use crate::scraping::feed_scraper::{ExtractContext, FeedScraper};
use crate::scraping::snapshot::{SnapshotError, SnapshotSource};
use crate::types::{PostRecord, RunOptions};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Scrolling,
    Extracting,
    Deciding,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Auto-scroll was off: one pass over the current view.
    SinglePass,
    MaxSteps,
    /// Too many consecutive passes without a new record.
    Patience,
    /// The operator asked to stop.
    Cancelled,
}

impl StopReason {
    pub fn describe(&self) -> &'static str {
        match self {
            StopReason::SinglePass => "single pass (auto-scroll off)",
            StopReason::MaxSteps => "scroll step limit reached",
            StopReason::Patience => "no new posts for several passes",
            StopReason::Cancelled => "stopped by operator",
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub step: usize,
    pub fragments: usize,
    pub inserted: usize,
    pub merged: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub total: usize,
    pub no_new_passes: usize,
}

impl PassStats {
    fn count(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted(_) => self.inserted += 1,
            MergeOutcome::Merged(_) => self.merged += 1,
            MergeOutcome::Filtered => self.filtered += 1,
            MergeOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub steps: usize,
    pub passes: Vec<PassStats>,
    pub total_records: usize,
}

/// Receives the final ordered collection when a run ends, whether or not it failed.
pub trait ReportSink {
    fn deliver(&mut self, page_url: Option<&str>, records: &[PostRecord], summary: Option<&RunSummary>);
}

pub struct ScrollController<'a, S: SnapshotSource + ?Sized> {
    source: &'a mut S,
    options: RunOptions,
    scraper: FeedScraper,
    stop: Arc<AtomicBool>,
    fallback_base_url: Option<String>,
    page_url: Option<String>,
    state: ControllerState,
}

impl<'a, S: SnapshotSource + ?Sized> ScrollController<'a, S> {
    pub fn new(source: &'a mut S, options: RunOptions) -> Self {
        Self {
            source,
            options,
            scraper: FeedScraper::new(),
            stop: Arc::new(AtomicBool::new(false)),
            fallback_base_url: None,
            page_url: None,
            state: ControllerState::Idle,
        }
    }

    /// Share a stop flag with a signal listener. Checked once per pass, at `Deciding`.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Base used for relative links when the source cannot report its own URL.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.fallback_base_url = base_url;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Page URL as reported by the source (or the configured fallback) once the run began.
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    /// Run to completion, then hand whatever was collected to `sink`, also after a fatal
    /// error.
    pub async fn run_with_sink(
        &mut self,
        session: &mut SessionState,
        sink: &mut dyn ReportSink,
    ) -> Result<RunSummary, ControllerError> {
        let result = self.run(session).await;
        sink.deliver(self.page_url(), session.records(), result.as_ref().ok());
        result
    }

    pub async fn run(&mut self, session: &mut SessionState) -> Result<RunSummary, ControllerError> {
        let result = self.run_inner(session).await;
        self.state = ControllerState::Done;
        result
    }

    async fn run_inner(&mut self, session: &mut SessionState) -> Result<RunSummary, ControllerError> {
        self.state = ControllerState::Idle;
        self.page_url = self
            .source
            .page_url()
            .await?
            .or_else(|| self.fallback_base_url.clone());
        info!(
            "run starting: page={} auto_scroll={} max_steps={:?} patience={} filter={:?}",
            self.page_url.as_deref().unwrap_or("<unknown>"),
            self.options.auto_scroll,
            self.options.max_steps,
            self.options.patience,
            session.filter()
        );

        let patience = self.options.patience.max(1);
        let mut passes = Vec::new();

        loop {
            self.state = ControllerState::Scrolling;
            let step = session.advance_step();
            if self.options.auto_scroll {
                if let Err(e) = self.source.scroll_and_wait(step).await {
                    warn!("scroll step {} failed, stopping the run: {}", step, e);
                    return Err(e.into());
                }
            }

            self.state = ControllerState::Extracting;
            let markup = self.source.get_markup().await?;
            let mut stats = self.extract_pass(&markup, step, session);

            self.state = ControllerState::Deciding;
            stats.no_new_passes = session.record_pass(stats.inserted);
            stats.total = session.len();
            info!(
                step = stats.step,
                fragments = stats.fragments,
                inserted = stats.inserted,
                merged = stats.merged,
                filtered = stats.filtered,
                skipped = stats.skipped,
                total = stats.total,
                no_new = stats.no_new_passes,
                "feed pass"
            );
            passes.push(stats);

            if let Some(reason) = self.decide(session, patience) {
                info!("run done after {} steps: {}", session.step(), reason.describe());
                return Ok(RunSummary {
                    stop_reason: reason,
                    steps: session.step(),
                    passes,
                    total_records: session.len(),
                });
            }
        }
    }

    /// Segment, extract and merge one snapshot. Synchronous: the parsed document never
    /// outlives this call.
    fn extract_pass(&self, markup: &str, step: usize, session: &mut SessionState) -> PassStats {
        let ctx = ExtractContext::new(self.page_url.as_deref(), Utc::now());
        let raws = self.scraper.extract_snapshot(markup, &ctx);
        let mut stats = PassStats {
            step,
            fragments: raws.len(),
            ..PassStats::default()
        };
        for raw in raws {
            stats.count(session.merge(raw, step));
        }
        debug!("pass {}: {:?}", step, stats);
        stats
    }

    fn decide(&self, session: &SessionState, patience: usize) -> Option<StopReason> {
        if !self.options.auto_scroll {
            return Some(StopReason::SinglePass);
        }
        if session.no_new_passes() >= patience {
            return Some(StopReason::Patience);
        }
        if let Some(max) = self.options.max_steps {
            if session.step() >= max.max(1) {
                return Some(StopReason::MaxSteps);
            }
        }
        if self.stop.load(Ordering::SeqCst) {
            return Some(StopReason::Cancelled);
        }
        None
    }
}
