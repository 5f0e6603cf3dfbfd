//! Job orchestration core: two cancellable remote phases, their state, and
//! the operator-facing log.
//!
//! - [`runner`] — generic single-job engine with progress and cancellation
//! - [`orchestrator`] — the URL discovery → detail extraction pipeline
//! - [`log`] — append-only job log

pub mod log;
pub mod orchestrator;
pub mod runner;

pub use log::LogSink;
pub use orchestrator::{ScrapeBackend, ScrapeOrchestrator};
pub use runner::{
    ActiveJob, JobOutcome, JobProgress, JobRunner, PhaseSnapshot, ProgressReporter,
    SilentProgress,
};
