pub mod identity;
pub mod report;
pub mod scroll_controller;
pub mod session;

pub use report::{FileReportSink, ReportError, ReportWriter};
pub use scroll_controller::{ControllerError, ReportSink, RunSummary, ScrollController, StopReason};
pub use session::{MergeOutcome, SessionState};
