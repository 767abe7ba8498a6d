//! The polling loop that drives reports through the pipeline.
//!
//! Each cycle scans for pending reports and processes them one at a time,
//! in scan order. Every report gets exactly one cleanup pass whatever
//! happens in the stages before it, and a failure (or panic) in one report
//! never reaches the next. Between cycles the driver sleeps for the poll
//! interval; cancellation is honored during the sleep and between
//! reports.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crackx_core::report::VideoReport;
use crackx_core::types::DbId;
use crackx_core::verdict::AggregateVerdict;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::aggregator::DetectionAggregator;
use crate::config::WorkerConfig;
use crate::detector::DetectionPort;
use crate::error::{ProcessError, Stage};
use crate::fetcher::VideoFetcher;
use crate::janitor::ArtifactJanitor;
use crate::sampler::FrameSampler;
use crate::scanner::PendingReportScanner;
use crate::scratch::ScratchDir;
use crate::store::ReportStore;
use crate::updater::ReportUpdater;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the driver is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Scanning,
    Processing(DbId),
    Stopped,
}

/// Tunables for the polling loop.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub poll_interval: Duration,
    pub sample_rate_hz: f64,
    pub min_confidence: f64,
}

impl From<&WorkerConfig> for DriverSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            sample_rate_hz: config.sample_rate_hz,
            min_confidence: config.min_confidence,
        }
    }
}

/// How one report left the pipeline without an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The verdict was written; the report is resolved.
    Updated(AggregateVerdict),
    /// The video decoded to zero frames. Report stays pending.
    NoFrames,
    /// No frame produced an accepted detection. Report stays pending.
    NoDetection { frames_sampled: usize },
}

/// Counters for one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub scanned: usize,
    pub updated: usize,
    pub no_detection: usize,
    pub failed: usize,
    pub scan_failed: bool,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct PollingDriver {
    scanner: PendingReportScanner,
    fetcher: Arc<dyn VideoFetcher>,
    sampler: Arc<dyn FrameSampler>,
    aggregator: DetectionAggregator,
    updater: ReportUpdater,
    janitor: ArtifactJanitor,
    settings: DriverSettings,
    state: watch::Sender<DriverState>,
}

impl PollingDriver {
    pub fn new(
        store: Arc<dyn ReportStore>,
        fetcher: Arc<dyn VideoFetcher>,
        sampler: Arc<dyn FrameSampler>,
        detector: Arc<dyn DetectionPort>,
        scratch: ScratchDir,
        settings: DriverSettings,
    ) -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self {
            scanner: PendingReportScanner::new(Arc::clone(&store)),
            fetcher,
            sampler,
            aggregator: DetectionAggregator::new(detector, settings.min_confidence),
            updater: ReportUpdater::new(store),
            janitor: ArtifactJanitor::new(scratch),
            settings,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Stale scratch videos from an earlier run are removed first. On return
    /// the state is [`DriverState::Stopped`].
    pub async fn run(&self, cancel: CancellationToken) {
        self.janitor.sweep().await;
        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            sample_rate_hz = self.settings.sample_rate_hz,
            min_confidence = self.settings.min_confidence,
            "Polling driver started"
        );

        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.state.send_replace(DriverState::Stopped);
        tracing::info!("Polling driver stopped");
    }

    /// One scan-and-process pass.
    ///
    /// A failed scan is logged and reported in the summary; the caller
    /// simply tries again next cycle.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleSummary {
        let mut summary = CycleSummary::default();

        self.state.send_replace(DriverState::Scanning);
        let reports = match self.scanner.scan().await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!(stage = %Stage::Scan, error = %e, "Scan failed");
                self.state.send_replace(DriverState::Idle);
                summary.scan_failed = true;
                return summary;
            }
        };
        summary.scanned = reports.len();
        if !reports.is_empty() {
            tracing::info!(pending = reports.len(), "Found pending video reports");
        }

        for report in &reports {
            if cancel.is_cancelled() {
                tracing::info!("Cancellation requested, ending cycle early");
                break;
            }
            self.state.send_replace(DriverState::Processing(report.id));

            match self.process_report(report).await {
                Ok(ReportOutcome::Updated(_)) => summary.updated += 1,
                Ok(ReportOutcome::NoFrames) => {
                    summary.no_detection += 1;
                    tracing::info!(report_id = report.id, "No frames sampled, report stays pending");
                }
                Ok(ReportOutcome::NoDetection { frames_sampled }) => {
                    summary.no_detection += 1;
                    tracing::info!(
                        report_id = report.id,
                        frames_sampled,
                        "No damage detected, report stays pending"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        report_id = report.id,
                        stage = %e.stage(),
                        error = %e,
                        "Report processing failed, will retry next cycle"
                    );
                }
            }
        }

        self.state.send_replace(DriverState::Idle);
        if summary.scanned > 0 {
            tracing::info!(
                scanned = summary.scanned,
                updated = summary.updated,
                no_detection = summary.no_detection,
                failed = summary.failed,
                "Cycle complete"
            );
        } else {
            tracing::debug!("Cycle complete, nothing pending");
        }
        summary
    }

    /// Run one report through every stage, then release its artifacts.
    pub async fn process_report(&self, report: &VideoReport) -> Result<ReportOutcome, ProcessError> {
        let stage = Mutex::new(Stage::Fetch);
        let result = AssertUnwindSafe(self.run_stages(report, &stage))
            .catch_unwind()
            .await;

        self.janitor.release(report.id).await;

        let last_stage = stage.lock().map(|s| *s).unwrap_or(Stage::Fetch);
        match result {
            Ok(outcome) => outcome,
            Err(payload) => Err(ProcessError::Panicked {
                stage: last_stage,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    async fn run_stages(
        &self,
        report: &VideoReport,
        stage: &Mutex<Stage>,
    ) -> Result<ReportOutcome, ProcessError> {
        enter(stage, Stage::Fetch);
        let video: PathBuf = self.fetcher.fetch(report).await?;

        enter(stage, Stage::Sample);
        let frames = self
            .sampler
            .sample(&video, self.settings.sample_rate_hz)
            .await?;
        if frames.is_empty() {
            return Ok(ReportOutcome::NoFrames);
        }
        tracing::debug!(report_id = report.id, frames = frames.len(), "Frames sampled");

        enter(stage, Stage::Detect);
        let Some(verdict) = self.aggregator.aggregate(&frames).await else {
            return Ok(ReportOutcome::NoDetection {
                frames_sampled: frames.len(),
            });
        };

        enter(stage, Stage::Update);
        self.updater.update(report.id, &verdict).await?;
        Ok(ReportOutcome::Updated(verdict))
    }
}

fn enter(stage: &Mutex<Stage>, next: Stage) {
    if let Ok(mut current) = stage.lock() {
        *current = next;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
