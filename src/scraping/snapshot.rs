//! The seam between the controller and whatever renders the feed.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The browser or tab went away; the run cannot continue.
    #[error("browser session lost: {0}")]
    SessionLost(String),
    /// The page refused a scroll step. The feed position is unknown afterwards, so this
    /// ends the run as well.
    #[error("scroll failed: {0}")]
    ScrollFailed(String),
}

/// A live page that can be read and scrolled. Every error is fatal for the run.
///
/// Markup is returned as an owned string so parsing never straddles an await.
#[async_trait]
pub trait SnapshotSource: Send {
    /// Current fully rendered markup of the page.
    async fn get_markup(&mut self) -> Result<String, SnapshotError>;

    /// Scroll one step and return once new content has had a chance to render.
    async fn scroll_and_wait(&mut self, step: usize) -> Result<(), SnapshotError>;

    /// Address of the page, when known. Used for link resolution and report naming.
    async fn page_url(&mut self) -> Result<Option<String>, SnapshotError> {
        Ok(None)
    }
}
