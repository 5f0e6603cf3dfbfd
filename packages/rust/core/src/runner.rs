//! Generic engine for one long-running, cancellable remote operation.
//!
//! A [`JobRunner`] moves through `Idle → Running → {Succeeded, Failed,
//! Cancelled}`. [`JobRunner::start`] hands out an [`ActiveJob`] that owns the
//! run's cancellation token and progress counter; the handle is released on
//! every exit path, including the `ActiveJob` (or the future driving it)
//! being dropped mid-flight.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use scrapedesk_remote::{TransferProgress, describe_failure};
use scrapedesk_shared::{JobPhase, PhaseKind, Result, ScrapeDeskError};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for presenting phase status.
pub trait ProgressReporter: Send + Sync {
    /// A phase entered Running.
    fn started(&self, phase: PhaseKind);
    /// Integer percentage, non-decreasing within a run. 100 is always sent
    /// on the terminal transition, whatever the outcome.
    fn progress(&self, phase: PhaseKind, percent: u8);
    /// A phase reached a terminal state.
    fn finished(&self, phase: PhaseKind, state: JobPhase);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn started(&self, _phase: PhaseKind) {}
    fn progress(&self, _phase: PhaseKind, _percent: u8) {}
    fn finished(&self, _phase: PhaseKind, _state: JobPhase) {}
}

/// Progress counter of one run (0–100, monotonically non-decreasing).
pub struct JobProgress {
    phase: PhaseKind,
    percent: AtomicU8,
    reporter: Arc<dyn ProgressReporter>,
}

impl JobProgress {
    fn new(phase: PhaseKind, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            phase,
            percent: AtomicU8::new(0),
            reporter,
        }
    }

    pub fn get(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Raise progress to `percent`. Lower values are ignored.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.reporter.progress(self.phase, percent);
        }
    }

    fn force_complete(&self) {
        self.percent.store(100, Ordering::SeqCst);
        self.reporter.progress(self.phase, 100);
    }
}

impl TransferProgress for JobProgress {
    /// Unknown totals leave progress where it is.
    fn transferred(&self, received: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let percent = (received.saturating_mul(100) + total / 2) / total;
        self.report(percent.min(100) as u8);
    }
}

// ---------------------------------------------------------------------------
// Outcomes and snapshots
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Succeeded(T),
    /// Operator-facing failure message.
    Failed(String),
    Cancelled,
}

impl<T> JobOutcome<T> {
    pub fn state(&self) -> JobPhase {
        match self {
            Self::Succeeded(_) => JobPhase::Succeeded,
            Self::Failed(_) => JobPhase::Failed,
            Self::Cancelled => JobPhase::Cancelled,
        }
    }
}

/// Observable state of one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSnapshot {
    pub state: JobPhase,
    pub progress: u8,
    /// Only set when `state` is Failed. Cancellation is not an error.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

struct JobHandle {
    run_id: Uuid,
    token: CancellationToken,
    progress: Arc<JobProgress>,
}

struct RunnerState {
    phase: JobPhase,
    /// Present exactly while `phase` is Running.
    handle: Option<JobHandle>,
    /// Progress shown when no run is active.
    settled_progress: u8,
    error: Option<String>,
}

/// Runs at most one job at a time for a single phase.
pub struct JobRunner {
    phase: PhaseKind,
    failure_fallback: &'static str,
    state: Mutex<RunnerState>,
}

impl JobRunner {
    /// `failure_fallback` is shown when a failure carries no usable message.
    pub fn new(phase: PhaseKind, failure_fallback: &'static str) -> Self {
        Self {
            phase,
            failure_fallback,
            state: Mutex::new(RunnerState {
                phase: JobPhase::Idle,
                handle: None,
                settled_progress: 0,
                error: None,
            }),
        }
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn state(&self) -> JobPhase {
        self.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        let state = self.lock();
        PhaseSnapshot {
            state: state.phase,
            progress: state
                .handle
                .as_ref()
                .map_or(state.settled_progress, |h| h.progress.get()),
            error: state.error.clone(),
        }
    }

    /// Enter Running and hand out the run's handle. Fails with
    /// [`ScrapeDeskError::JobAlreadyRunning`] if a run is in flight.
    pub fn start(&self, reporter: &Arc<dyn ProgressReporter>) -> Result<ActiveJob<'_>> {
        let mut state = self.lock();
        if state.phase.is_running() {
            return Err(ScrapeDeskError::JobAlreadyRunning { phase: self.phase });
        }

        let run_id = Uuid::now_v7();
        let token = CancellationToken::new();
        let progress = Arc::new(JobProgress::new(self.phase, Arc::clone(reporter)));
        state.phase = JobPhase::Running;
        state.error = None;
        state.handle = Some(JobHandle {
            run_id,
            token: token.clone(),
            progress: Arc::clone(&progress),
        });
        drop(state);

        debug!(phase = %self.phase, %run_id, "job started");
        reporter.started(self.phase);

        Ok(ActiveJob {
            runner: self,
            run_id,
            token,
            progress,
            settled: false,
        })
    }

    /// Signal cancellation to the running job. Returns `false` when nothing
    /// is running; a settled run is never affected.
    pub fn cancel(&self) -> bool {
        match &self.lock().handle {
            Some(handle) => {
                handle.token.cancel();
                info!(phase = %self.phase, run_id = %handle.run_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Return to Idle, clearing progress and error. Rejected while Running.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        if state.phase.is_running() {
            return Err(ScrapeDeskError::JobAlreadyRunning { phase: self.phase });
        }
        state.phase = JobPhase::Idle;
        state.settled_progress = 0;
        state.error = None;
        Ok(())
    }

    /// Terminal transition for `run_id`: release the handle, force progress
    /// to 100, record the outcome.
    fn finish(&self, run_id: Uuid, outcome: JobPhase, error: Option<String>) {
        let released = {
            let mut state = self.lock();
            match state.handle.take() {
                Some(handle) if handle.run_id == run_id => {
                    state.phase = outcome;
                    state.settled_progress = 100;
                    state.error = error;
                    Some(handle)
                }
                other => {
                    // Not ours; put it back untouched.
                    state.handle = other;
                    None
                }
            }
        };

        if let Some(handle) = released {
            handle.progress.force_complete();
            handle.progress.reporter.finished(self.phase, outcome);
            debug!(phase = %self.phase, %run_id, %outcome, "job settled");
        }
    }

    fn failure_message(&self, err: &ScrapeDeskError) -> String {
        match err {
            ScrapeDeskError::Remote { message } => {
                describe_failure(Some(message), None, self.failure_fallback)
            }
            other => describe_failure(None, Some(&other.to_string()), self.failure_fallback),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ActiveJob
// ---------------------------------------------------------------------------

/// A started run. Owns the cancellation token for the Running duration.
pub struct ActiveJob<'a> {
    runner: &'a JobRunner,
    run_id: Uuid,
    token: CancellationToken,
    progress: Arc<JobProgress>,
    settled: bool,
}

impl ActiveJob<'_> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drive `op` to completion or cancellation and settle the runner.
    ///
    /// On cancellation the `op` future is dropped, which aborts any in-flight
    /// request it holds. A cancel that races with completion wins.
    pub async fn run<T, F, Fut>(mut self, op: F) -> JobOutcome<T>
    where
        F: FnOnce(Arc<JobProgress>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = info_span!("job", phase = %self.runner.phase, run_id = %self.run_id);
        let token = self.token.clone();
        let work = op(Arc::clone(&self.progress));

        let result = async {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ScrapeDeskError::Cancelled),
                result = work => result,
            }
        }
        .instrument(span)
        .await;

        let (outcome, error) = match result {
            Ok(value) => (JobOutcome::Succeeded(value), None),
            Err(e) if e.is_cancelled() => (JobOutcome::Cancelled, None),
            Err(e) => {
                let message = self.runner.failure_message(&e);
                warn!(phase = %self.runner.phase, run_id = %self.run_id, error = %e, "job failed");
                (JobOutcome::Failed(message.clone()), Some(message))
            }
        };

        self.settled = true;
        self.runner.finish(self.run_id, outcome.state(), error);
        outcome
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.runner
                .finish(self.run_id, JobPhase::Cancelled, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn silent() -> Arc<dyn ProgressReporter> {
        Arc::new(SilentProgress)
    }

    fn runner() -> JobRunner {
        JobRunner::new(PhaseKind::UrlDiscovery, "Failed to run job.")
    }

    #[tokio::test]
    async fn success_forces_progress_to_100() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        assert_eq!(runner.state(), JobPhase::Running);

        let outcome = job.run(|_progress| async { Ok::<_, ScrapeDeskError>(7) }).await;
        assert_eq!(outcome, JobOutcome::Succeeded(7));
        assert_eq!(
            runner.snapshot(),
            PhaseSnapshot {
                state: JobPhase::Succeeded,
                progress: 100,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let runner = runner();
        let reporter = silent();
        let first = runner.start(&reporter).expect("start");
        let err = runner.start(&reporter).err().expect("second start rejected");
        assert!(matches!(
            err,
            ScrapeDeskError::JobAlreadyRunning {
                phase: PhaseKind::UrlDiscovery
            }
        ));

        let outcome = first.run(|_| async { Ok::<_, ScrapeDeskError>("done") }).await;
        assert_eq!(outcome, JobOutcome::Succeeded("done"));
    }

    #[tokio::test]
    async fn cancel_during_flight_yields_cancelled() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");

        let (outcome, cancelled) = tokio::join!(
            job.run(|progress| async move {
                progress.report(40);
                std::future::pending::<Result<()>>().await
            }),
            async {
                tokio::task::yield_now().await;
                runner.cancel()
            }
        );

        assert!(cancelled);
        assert_eq!(outcome, JobOutcome::Cancelled);
        let snapshot = runner.snapshot();
        assert_eq!(snapshot.state, JobPhase::Cancelled);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.error, None);
    }

    #[tokio::test]
    async fn cancel_after_settlement_is_a_no_op() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        job.run(|_| async { Ok::<_, ScrapeDeskError>(()) }).await;

        assert!(!runner.cancel());
        assert_eq!(runner.state(), JobPhase::Succeeded);

        // A fresh run gets a fresh token.
        let job = runner.start(&silent()).expect("restart");
        let outcome = job.run(|_| async { Ok::<_, ScrapeDeskError>(1) }).await;
        assert_eq!(outcome, JobOutcome::Succeeded(1));
    }

    #[tokio::test]
    async fn failure_message_prefers_remote_text() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        let outcome = job
            .run(|_| async { Err::<(), _>(ScrapeDeskError::remote("service overloaded")) })
            .await;
        assert_eq!(outcome, JobOutcome::Failed("service overloaded".into()));
        assert_eq!(runner.snapshot().error.as_deref(), Some("service overloaded"));
        assert_eq!(runner.snapshot().progress, 100);
    }

    #[tokio::test]
    async fn blank_failure_falls_back() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        let outcome = job
            .run(|_| async { Err::<(), _>(ScrapeDeskError::remote("")) })
            .await;
        assert_eq!(outcome, JobOutcome::Failed("Failed to run job.".into()));
    }

    #[tokio::test]
    async fn dropping_the_job_releases_the_handle() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            job.run(|_| std::future::pending::<Result<()>>()),
        )
        .await;
        assert!(timed_out.is_err());

        let snapshot = runner.snapshot();
        assert_eq!(snapshot.state, JobPhase::Cancelled);
        assert_eq!(snapshot.progress, 100);
        assert!(!runner.cancel());
        assert!(runner.start(&silent()).is_ok());
    }

    #[tokio::test]
    async fn reset_only_when_not_running() {
        let runner = runner();
        let job = runner.start(&silent()).expect("start");
        assert!(runner.reset().is_err());
        job.run(|_| async { Ok::<_, ScrapeDeskError>(()) }).await;

        runner.reset().expect("reset");
        assert_eq!(
            runner.snapshot(),
            PhaseSnapshot {
                state: JobPhase::Idle,
                progress: 0,
                error: None
            }
        );
    }

    #[test]
    fn byte_progress_is_monotonic_and_rounded() {
        let progress = JobProgress::new(PhaseKind::DetailExtraction, silent());
        progress.transferred(0, None);
        progress.transferred(500, None);
        assert_eq!(progress.get(), 0);

        progress.transferred(1, Some(3));
        assert_eq!(progress.get(), 33);
        progress.transferred(2, Some(3));
        assert_eq!(progress.get(), 67);
        progress.transferred(1, Some(3));
        assert_eq!(progress.get(), 67);
        progress.transferred(3, Some(3));
        assert_eq!(progress.get(), 100);
    }
}
