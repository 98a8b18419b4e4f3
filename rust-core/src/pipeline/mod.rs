//! Capture pipeline: orchestration, cancellation and reporting

pub mod capture_loop;
pub mod report;
pub mod stop;

pub use capture_loop::{CaptureLoop, CaptureState, RunFailure, RunSummary, StopReason};
pub use report::{
    BinTableReporter, FrameReport, LevelReporter, PeakReporter, Reporter, ReporterSet,
};
pub use stop::StopToken;
