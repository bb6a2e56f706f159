pub mod cli;
pub mod core;
pub mod features;
pub mod scraping;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{load_scout_config, ScoutConfig};

// --- Short module paths ---
pub use features::{identity, report, scroll_controller, session};
pub use scraping::{browser_manager, feed_scraper, snapshot};
