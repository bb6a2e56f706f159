pub mod browser_manager;
pub mod feed_scraper;
pub mod snapshot;

pub use browser_manager::{CdpOptions, CdpSnapshotSource};
pub use snapshot::{SnapshotError, SnapshotSource};
