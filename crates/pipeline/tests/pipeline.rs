//! End-to-end tests of the polling driver with in-memory collaborators.
//!
//! - a resolved verdict is written and the report leaves the pending set
//! - zero accepted detections leave the report pending
//! - fetch, store and sampler failures are contained to one report
//! - scratch videos never outlive their report's processing
//! - cancellation stops the driver between reports and during the sleep

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use crackx_core::detection::{BoundingBox, DamageType, Detection, Severity};
use crackx_core::report::{Frame, VideoReport};
use crackx_core::types::DbId;
use crackx_pipeline::detector::DetectionPort;
use crackx_pipeline::driver::{DriverSettings, DriverState, PollingDriver};
use crackx_pipeline::error::{DecodeError, FetchError, InferenceError, StoreError};
use crackx_pipeline::fetcher::VideoFetcher;
use crackx_pipeline::sampler::FrameSampler;
use crackx_pipeline::scratch::ScratchDir;
use crackx_pipeline::store::ReportStore;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    reports: Mutex<Vec<VideoReport>>,
    fail_scan: Mutex<bool>,
    fail_update: Mutex<bool>,
    updates: AtomicUsize,
}

impl MemoryStore {
    fn with_videos(ids: &[DbId]) -> Arc<Self> {
        let store = Self::default();
        *store.reports.lock().unwrap() = ids
            .iter()
            .map(|&id| VideoReport {
                id,
                video_uri: Some(format!("https://cdn.example.com/{id}.mp4")),
                detection: None,
            })
            .collect();
        Arc::new(store)
    }

    fn detection(&self, id: DbId) -> Option<Detection> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.detection.clone())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_pending_video_reports(&self) -> Result<Vec<VideoReport>, StoreError> {
        if *self.fail_scan.lock().unwrap() {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect())
    }

    async fn update_detection(&self, id: DbId, detection: &Detection) -> Result<(), StoreError> {
        if *self.fail_update.lock().unwrap() {
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        let mut reports = self.reports.lock().unwrap();
        let report = reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        report.detection = Some(detection.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes a small placeholder file to the scratch path.
struct ScratchFetcher {
    scratch: ScratchDir,
    timeouts: Mutex<Vec<DbId>>,
    calls: Mutex<Vec<DbId>>,
    // Cancels this token when fetching the given report.
    cancel_on: Option<(DbId, CancellationToken)>,
}

impl ScratchFetcher {
    fn new(scratch: ScratchDir) -> Self {
        Self {
            scratch,
            timeouts: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            cancel_on: None,
        }
    }

    fn calls(&self) -> Vec<DbId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoFetcher for ScratchFetcher {
    async fn fetch(&self, report: &VideoReport) -> Result<PathBuf, FetchError> {
        self.calls.lock().unwrap().push(report.id);
        if let Some((id, token)) = &self.cancel_on {
            if *id == report.id {
                token.cancel();
            }
        }
        if self.timeouts.lock().unwrap().contains(&report.id) {
            return Err(FetchError::Timeout);
        }
        self.scratch.ensure().await?;
        let path = self.scratch.video_path(report.id);
        tokio::fs::write(&path, b"fake video").await?;
        Ok(path)
    }
}

/// Produces a fixed number of frames per report; frame data is one byte,
/// `report_id * 100 + index`, truncated.
struct CountingSampler {
    frames: HashMap<DbId, usize>,
    panic_on: Option<DbId>,
    seen_paths: Mutex<Vec<PathBuf>>,
}

impl CountingSampler {
    fn new(frames: &[(DbId, usize)]) -> Self {
        Self {
            frames: frames.iter().copied().collect(),
            panic_on: None,
            seen_paths: Mutex::new(Vec::new()),
        }
    }
}

fn report_of(path: &Path) -> DbId {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse().ok())
        .unwrap()
}

#[async_trait]
impl FrameSampler for CountingSampler {
    async fn sample(&self, video: &Path, _rate_hz: f64) -> Result<Vec<Frame>, DecodeError> {
        assert!(video.exists(), "sampler runs while the video is on disk");
        self.seen_paths.lock().unwrap().push(video.to_path_buf());
        let id = report_of(video);
        if self.panic_on == Some(id) {
            panic!("decoder crashed");
        }
        let n = self.frames.get(&id).copied().unwrap_or(0);
        Ok((0..n)
            .map(|i| Frame {
                index: i,
                source_frame: i as u64 * 30,
                data: vec![(id as usize * 100 + i) as u8],
            })
            .collect())
    }
}

/// Scripted per-frame answers keyed by the frame's data byte.
#[derive(Default)]
struct ScriptedDetector {
    answers: HashMap<u8, Result<Detection, u16>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn answer(mut self, key: usize, det: Detection) -> Self {
        self.answers.insert(key as u8, Ok(det));
        self
    }

    fn fail(mut self, key: usize, status: u16) -> Self {
        self.answers.insert(key as u8, Err(status));
        self
    }
}

#[async_trait]
impl DetectionPort for ScriptedDetector {
    async fn detect(&self, image: &[u8]) -> Result<Option<Detection>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answers.get(&image[0]) {
            None => Ok(None),
            Some(Ok(det)) => Ok(Some(det.clone())),
            Some(Err(status)) => Err(InferenceError::HttpStatus(*status)),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn det(damage_type: DamageType, confidence: f64) -> Detection {
    Detection::new(damage_type, confidence, BoundingBox::clamped(0.3, 0.3, 0.1, 0.1)).unwrap()
}

fn settings() -> DriverSettings {
    DriverSettings {
        poll_interval: Duration::from_millis(20),
        sample_rate_hz: 1.0,
        min_confidence: 0.3,
    }
}

struct Harness {
    _tmp: tempfile::TempDir,
    scratch: ScratchDir,
    store: Arc<MemoryStore>,
    fetcher: Arc<ScratchFetcher>,
    sampler: Arc<CountingSampler>,
    detector: Arc<ScriptedDetector>,
}

impl Harness {
    fn new(
        ids: &[DbId],
        frames: &[(DbId, usize)],
        detector: ScriptedDetector,
        configure: impl FnOnce(&mut ScratchFetcher, &mut CountingSampler),
    ) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(tmp.path().join("scratch"));
        let mut fetcher = ScratchFetcher::new(scratch.clone());
        let mut sampler = CountingSampler::new(frames);
        configure(&mut fetcher, &mut sampler);
        Self {
            _tmp: tmp,
            scratch,
            store: MemoryStore::with_videos(ids),
            fetcher: Arc::new(fetcher),
            sampler: Arc::new(sampler),
            detector: Arc::new(detector),
        }
    }

    fn driver(&self) -> PollingDriver {
        PollingDriver::new(
            self.store.clone(),
            self.fetcher.clone(),
            self.sampler.clone(),
            self.detector.clone(),
            self.scratch.clone(),
            settings(),
        )
    }

    fn assert_scratch_empty(&self) {
        if let Ok(mut entries) = std::fs::read_dir(self.scratch.root()) {
            assert!(entries.next().is_none(), "scratch directory not empty");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mixed_video_resolves_to_strongest_pothole() {
    // Report 1: ten frames, frame data bytes 100..=109.
    let detector = ScriptedDetector::default()
        .answer(101, det(DamageType::Pothole, 0.9))
        .answer(103, det(DamageType::Crack, 0.5))
        .answer(104, det(DamageType::Pothole, 0.4))
        .answer(106, det(DamageType::Crack, 0.7))
        .answer(108, det(DamageType::Pothole, 0.6));
    let h = Harness::new(&[1], &[(1, 10)], detector, |_, _| {});
    let driver = h.driver();

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.updated, 1);

    let stored = h.store.detection(1).unwrap();
    assert_eq!(stored.damage_type, DamageType::Pothole);
    assert_eq!(stored.confidence, 0.9);
    assert_eq!(stored.severity, Severity::High);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 10);
    h.assert_scratch_empty();

    // Resolved: the next cycle finds nothing to do.
    let again = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(again.scanned, 0);
    assert_eq!(h.fetcher.calls(), vec![1]);
}

#[tokio::test]
async fn low_confidence_video_stays_pending() {
    let detector = (0..5).fold(ScriptedDetector::default(), |d, i| {
        d.answer(200 + i, det(DamageType::Crack, 0.2))
    });
    let h = Harness::new(&[2], &[(2, 5)], detector, |_, _| {});
    let driver = h.driver();

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.no_detection, 1);
    assert_eq!(summary.updated, 0);
    assert!(h.store.detection(2).is_none());
    assert_eq!(h.store.updates.load(Ordering::SeqCst), 0);
    h.assert_scratch_empty();

    // Still pending: retried next cycle.
    driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(h.fetcher.calls(), vec![2, 2]);
}

#[tokio::test]
async fn fetch_timeout_fails_report_and_retries() {
    let h = Harness::new(&[3], &[(3, 4)], ScriptedDetector::default(), |fetcher, _| {
        fetcher.timeouts.lock().unwrap().push(3);
    });
    let driver = h.driver();

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.failed, 1);
    assert!(h.store.detection(3).is_none());
    assert!(h.sampler.seen_paths.lock().unwrap().is_empty());
    h.assert_scratch_empty();

    driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(h.fetcher.calls(), vec![3, 3]);
}

#[tokio::test]
async fn failing_frames_are_skipped() {
    // 4 frames of report 1: bytes 100..=103.
    let detector = ScriptedDetector::default()
        .fail(100, 500)
        .answer(101, det(DamageType::Crack, 0.55))
        .fail(102, 503)
        .answer(103, det(DamageType::AlligatorCrack, 0.35));
    let h = Harness::new(&[1], &[(1, 4)], detector, |_, _| {});

    let summary = h.driver().run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.updated, 1);
    let stored = h.store.detection(1).unwrap();
    assert_eq!(stored.damage_type, DamageType::Crack);
    assert_eq!(stored.confidence, 0.55);
}

#[tokio::test]
async fn zero_frames_leave_report_pending() {
    let h = Harness::new(&[1], &[], ScriptedDetector::default(), |_, _| {});

    let summary = h.driver().run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.no_detection, 1);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.detection(1).is_none());
    h.assert_scratch_empty();
}

#[tokio::test]
async fn store_failure_keeps_report_pending() {
    let detector = ScriptedDetector::default().answer(100, det(DamageType::Pothole, 0.8));
    let h = Harness::new(&[1], &[(1, 2)], detector, |_, _| {});
    *h.store.fail_update.lock().unwrap() = true;
    let driver = h.driver();

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.failed, 1);
    assert!(h.store.detection(1).is_none());
    h.assert_scratch_empty();

    *h.store.fail_update.lock().unwrap() = false;
    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.updated, 1);
    assert_eq!(h.store.detection(1).unwrap().damage_type, DamageType::Pothole);
}

#[tokio::test]
async fn scan_failure_is_survived() {
    let detector = ScriptedDetector::default().answer(100, det(DamageType::Crack, 0.9));
    let h = Harness::new(&[1], &[(1, 1)], detector, |_, _| {});
    *h.store.fail_scan.lock().unwrap() = true;
    let driver = h.driver();

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert!(summary.scan_failed);
    assert!(h.fetcher.calls().is_empty());
    assert_eq!(driver.state(), DriverState::Idle);

    *h.store.fail_scan.lock().unwrap() = false;
    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.updated, 1);
}

#[tokio::test]
async fn sampler_panic_is_contained() {
    let detector = ScriptedDetector::default()
        .answer(100, det(DamageType::Crack, 0.9))
        .answer(200, det(DamageType::Pothole, 0.8));
    let h = Harness::new(&[1, 2], &[(1, 1), (2, 1)], detector, |_, sampler| {
        sampler.panic_on = Some(1);
    });
    let driver = h.driver();

    let report = VideoReport {
        id: 1,
        video_uri: Some("https://cdn.example.com/1.mp4".into()),
        detection: None,
    };
    let err = driver.process_report(&report).await.unwrap_err();
    assert_matches!(
        err,
        crackx_pipeline::error::ProcessError::Panicked {
            stage: crackx_pipeline::error::Stage::Sample,
            ..
        }
    );
    assert!(!h.scratch.video_path(1).exists());

    let summary = driver.run_cycle(&CancellationToken::new()).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 1);
    assert!(h.store.detection(1).is_none());
    assert_eq!(h.store.detection(2).unwrap().damage_type, DamageType::Pothole);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn cancelled_before_start_stops_immediately() {
    let h = Harness::new(&[1], &[(1, 1)], ScriptedDetector::default(), |_, _| {});
    let driver = h.driver();
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), driver.run(cancel))
        .await
        .expect("driver stops");
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn cancellation_mid_cycle_stops_before_next_report() {
    let cancel = CancellationToken::new();
    let detector = ScriptedDetector::default()
        .answer(100, det(DamageType::Crack, 0.9))
        .answer(200, det(DamageType::Crack, 0.9));
    let token = cancel.clone();
    let h = Harness::new(&[1, 2], &[(1, 1), (2, 1)], detector, move |fetcher, _| {
        fetcher.cancel_on = Some((1, token));
    });
    let driver = h.driver();

    tokio::time::timeout(Duration::from_secs(5), driver.run(cancel))
        .await
        .expect("driver stops");

    // Report 1 finishes; report 2 is never started.
    assert_eq!(h.fetcher.calls(), vec![1]);
    assert!(h.store.detection(1).is_some());
    assert!(h.store.detection(2).is_none());
    assert_eq!(driver.state(), DriverState::Stopped);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn cancellation_during_sleep_stops_driver() {
    let h = Harness::new(&[], &[], ScriptedDetector::default(), |_, _| {});
    let driver = Arc::new(PollingDriver::new(
        h.store.clone(),
        h.fetcher.clone(),
        h.sampler.clone(),
        h.detector.clone(),
        h.scratch.clone(),
        DriverSettings {
            poll_interval: Duration::from_secs(3600),
            ..settings()
        },
    ));
    let mut state = driver.subscribe();
    let cancel = CancellationToken::new();

    let handle = {
        let driver = Arc::clone(&driver);
        let cancel = cancel.clone();
        tokio::spawn(async move { driver.run(cancel).await })
    };

    // Wait until the first cycle has finished and the driver is sleeping.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            state.changed().await.unwrap();
            if *state.borrow() == DriverState::Idle {
                break;
            }
        }
    })
    .await
    .expect("first cycle completes");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("driver stops")
        .unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
}

#[tokio::test]
async fn startup_sweep_removes_stale_videos() {
    let h = Harness::new(&[], &[], ScriptedDetector::default(), |_, _| {});
    h.scratch.ensure().await.unwrap();
    tokio::fs::write(h.scratch.video_path(42), b"left over").await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    h.driver().run(cancel).await;

    assert!(!h.scratch.video_path(42).exists());
}
