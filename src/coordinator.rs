//! Upload coordinator: drives the periodic cycle and owns [`UploadStatus`].
//!
//! A single task runs the loop. It waits for either the schedule deadline or a
//! manual trigger, then runs one cycle to completion before looking at the
//! next event, so cycles never overlap. Manual triggers go through a channel
//! of capacity one: a trigger arriving while a cycle is in flight is queued,
//! any further ones are coalesced.
//!
//! Status is published through a `watch` channel. The coordinator is its only
//! writer and replaces it in one step at the end of each cycle, so readers
//! never see a half-updated status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::client::Uploader;
use crate::models::{Credentials, ParameterMapping, UploadOutcome, UploadStatus};
use crate::payload;
use crate::registry::SensorRegistry;
use crate::snapshot::{self, Snapshot};

/// Lower bound imposed by the WOW service rate limits.
pub const MIN_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

// ---

/// Clamp an upload interval into `[MIN_INTERVAL, MAX_INTERVAL]`.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    // ---
    pub credentials: Credentials,
    pub mapping: ParameterMapping,
    pub interval: Duration,
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

/// What happened to a manual trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerResult {
    /// A cycle will run as soon as the coordinator is free.
    Queued,
    /// A manual cycle is already pending; this request was folded into it.
    Coalesced,
    /// The coordinator is no longer running.
    Stopped,
}

pub struct Coordinator {
    settings: CoordinatorSettings,
    registry: Arc<dyn SensorRegistry>,
    uploader: Arc<dyn Uploader>,
    status_tx: watch::Sender<UploadStatus>,
}

impl Coordinator {
    // ---
    pub fn new(
        mut settings: CoordinatorSettings,
        registry: Arc<dyn SensorRegistry>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        // ---
        settings.interval = clamp_interval(settings.interval);

        if settings.mapping.is_empty() {
            warn!("No sensors mapped, uploads will carry only the required fields");
        }

        let status = UploadStatus::new(settings.credentials.site_id.clone(), settings.debug_mode);
        let (status_tx, _) = watch::channel(status);

        Self {
            settings,
            registry,
            uploader,
            status_tx,
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.status_tx.borrow().clone()
    }

    /// Start the scheduling loop. The first cycle runs immediately.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        // ---
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let shutdown = Arc::new(Notify::new());

        let handle = CoordinatorHandle {
            trigger_tx,
            status_rx: self.status_tx.subscribe(),
            shutdown: shutdown.clone(),
        };

        let task = tokio::spawn(self.run(trigger_rx, shutdown));
        (handle, task)
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, shutdown: Arc<Notify>) {
        // ---
        info!(
            "Upload coordinator started for site {} (every {}s, {} sensors mapped)",
            self.settings.credentials.site_id,
            self.settings.interval.as_secs(),
            self.settings.mapping.len()
        );

        let interval = self.settings.interval;
        let mut deadline = Instant::now();

        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                _ = sleep_until(deadline) => {
                    deadline = next_deadline(deadline, interval, Instant::now());
                    TriggerKind::Scheduled
                }
                request = trigger_rx.recv() => match request {
                    Some(()) => TriggerKind::Manual,
                    None => break,
                },
            };

            let next_upload = wall_clock(deadline);

            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    info!("Shutdown during upload cycle, abandoning it");
                    break;
                }
                _ = self.run_cycle(trigger, next_upload) => {}
            }
        }

        info!("Upload coordinator stopped");
    }

    /// Run one collect, convert, build, upload sequence and record its outcome.
    pub async fn run_cycle(&self, trigger: TriggerKind, next_upload: DateTime<Utc>) -> UploadOutcome {
        // ---
        let span = info_span!("upload_cycle", trigger = ?trigger);

        async move {
            let at = Utc::now();
            let (outcome, sent) = self.collect_and_upload(at).await;

            self.log_outcome(&outcome, next_upload);
            self.status_tx
                .send_modify(|status| status.record(&outcome, at, next_upload, sent));

            outcome
        }
        .instrument(span)
        .await
    }

    async fn collect_and_upload(
        &self,
        at: DateTime<Utc>,
    ) -> (UploadOutcome, Option<std::collections::BTreeMap<String, String>>) {
        // ---
        let readings = match snapshot::read_snapshot(&self.settings.mapping, &*self.registry).await {
            Snapshot::Complete(readings) => readings,
            Snapshot::Incomplete(missing) => {
                return (UploadOutcome::SensorsUnavailable(missing), None);
            }
        };

        let converted = match snapshot::convert(&readings, at) {
            Ok(converted) => converted,
            Err(failed) => return (UploadOutcome::SensorsUnavailable(failed), None),
        };

        let params = payload::build_params(&converted, &self.settings.credentials, at);

        if self.settings.debug_mode {
            info!("Debug - sending data: {:?}", payload::masked(&params));
        } else {
            debug!("Sending {} weather fields", converted.values.len());
        }

        let outcome = self.uploader.upload(&params).await;
        (outcome, Some(payload::debug_view(&params)))
    }

    fn log_outcome(&self, outcome: &UploadOutcome, next_upload: DateTime<Utc>) {
        // ---
        match outcome {
            UploadOutcome::Success => {
                info!("Uploaded weather data, next upload at {}", next_upload)
            }
            UploadOutcome::RateLimited => warn!(
                "WOW rate limit exceeded (429), consider a longer interval; next upload at {}",
                next_upload
            ),
            UploadOutcome::SensorsUnavailable(_) | UploadOutcome::NetworkError { .. } => {
                warn!("Upload skipped: {}; next attempt at {}", outcome.describe(), next_upload)
            }
            UploadOutcome::AuthError { .. } | UploadOutcome::Rejected { .. } => {
                error!("Upload failed: {}; next attempt at {}", outcome.describe(), next_upload)
            }
        }
    }
}

/// Following deadline on the fixed schedule. If the loop fell behind, the
/// schedule restarts from `now` instead of firing a burst of catch-up cycles.
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next <= now {
        now + interval
    } else {
        next
    }
}

fn wall_clock(deadline: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
}

// ---

/// Host-facing handle to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    trigger_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<UploadStatus>,
    shutdown: Arc<Notify>,
}

impl CoordinatorHandle {
    // ---
    /// Request an immediate cycle. The schedule baseline is left untouched.
    pub fn trigger_now(&self) -> TriggerResult {
        match self.trigger_tx.try_send(()) {
            Ok(()) => TriggerResult::Queued,
            Err(mpsc::error::TrySendError::Full(())) => TriggerResult::Coalesced,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerResult::Stopped,
        }
    }

    /// Snapshot of the current status.
    pub fn get_status(&self) -> UploadStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver notified after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status_rx.clone()
    }

    /// Stop the timer and abandon any in-flight upload.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{OutcomeKind, Parameter, StatusState};
    use crate::registry::MemoryRegistry;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Uploader double that records calls and can hold requests open.
    struct FakeUploader {
        outcome: UploadOutcome,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        gate: Option<Arc<Notify>>,
        sent: Mutex<Vec<Vec<(&'static str, String)>>>,
    }

    impl FakeUploader {
        fn new(outcome: UploadOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                gate: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn gated(outcome: UploadOutcome, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(outcome)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn upload(&self, params: &[(&'static str, String)]) -> UploadOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.sent.lock().unwrap().push(params.to_vec());

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn settings(mapping: &[(Parameter, &str)], interval: Duration, debug_mode: bool) -> CoordinatorSettings {
        CoordinatorSettings {
            credentials: Credentials {
                site_id: "6a571450-df53-e611-9401-0003ff5987fd".to_string(),
                auth_key: "123456".to_string(),
            },
            mapping: mapping.iter().map(|(p, id)| (*p, id.to_string())).collect(),
            interval,
            debug_mode,
        }
    }

    async fn registry_with_temperature() -> Arc<MemoryRegistry> {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set("sensor.outdoor_temp", "22.5", Some("°C")).await;
        registry
    }

    fn in_ten_minutes() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::minutes(10)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_interval_clamping() {
        // ---
        assert_eq!(clamp_interval(Duration::from_secs(5 * 60)), MIN_INTERVAL);
        assert_eq!(clamp_interval(Duration::from_secs(15 * 60)), Duration::from_secs(15 * 60));
        assert_eq!(clamp_interval(Duration::from_secs(90 * 60)), MAX_INTERVAL);
    }

    #[tokio::test]
    async fn test_five_minute_interval_is_clamped_before_scheduling() {
        // ---
        let coordinator = Coordinator::new(
            settings(&[], Duration::from_secs(5 * 60), false),
            Arc::new(MemoryRegistry::new()),
            Arc::new(FakeUploader::new(UploadOutcome::Success)),
        );

        let started = Utc::now();
        let (handle, task) = coordinator.spawn();
        let mut rx = handle.subscribe();
        let next = rx
            .wait_for(|s| s.last_outcome.is_some())
            .await
            .unwrap()
            .next_upload
            .unwrap();

        assert!(next >= started + chrono::Duration::seconds(599));

        handle.shutdown();
        task.await.unwrap();
    }

    #[test]
    fn test_next_deadline_keeps_fixed_cadence() {
        // ---
        let start = Instant::now();
        let interval = Duration::from_secs(600);

        assert_eq!(next_deadline(start, interval, start), start + interval);
        // Behind schedule: restart from now
        let late = start + Duration::from_secs(1500);
        assert_eq!(next_deadline(start, interval, late), late + interval);
    }

    #[tokio::test]
    async fn test_success_increments_count_once() {
        // ---
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::Success));
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            uploader.clone(),
        );

        let before = Utc::now();
        let next = in_ten_minutes();
        let outcome = coordinator.run_cycle(TriggerKind::Scheduled, next).await;
        let after = Utc::now();

        assert_eq!(outcome, UploadOutcome::Success);
        let status = coordinator.status();
        assert_eq!(status.state, StatusState::Ok);
        assert_eq!(status.upload_count, 1);
        assert_eq!(status.next_upload, Some(next));
        let last_upload = status.last_upload.unwrap();
        assert!(before <= last_upload && last_upload <= after);
        assert!(status.last_error.is_none());
        assert!(status.last_sent_data.is_none());
        assert_eq!(uploader.calls(), 1);
    }

    #[tokio::test]
    async fn test_payload_contains_only_mapped_fields() {
        // ---
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::Success));
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            uploader.clone(),
        );

        coordinator.run_cycle(TriggerKind::Manual, in_ten_minutes()).await;

        let sent = uploader.sent.lock().unwrap();
        let params = &sent[0];
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["siteid", "siteAuthenticationKey", "dateutc", "softwaretype", "tempf"]
        );
        let tempf: f64 = params[4].1.parse().unwrap();
        assert!((tempf - 72.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_unavailable_sensor_skips_upload() {
        // ---
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::Success));
        let coordinator = Coordinator::new(
            settings(
                &[
                    (Parameter::Temperature, "sensor.outdoor_temp"),
                    (Parameter::Humidity, "sensor.humidity"),
                ],
                MIN_INTERVAL,
                false,
            ),
            registry_with_temperature().await,
            uploader.clone(),
        );

        let outcome = coordinator.run_cycle(TriggerKind::Scheduled, in_ten_minutes()).await;

        assert_eq!(
            outcome,
            UploadOutcome::SensorsUnavailable(BTreeSet::from([Parameter::Humidity]))
        );
        let status = coordinator.status();
        assert_eq!(status.state, StatusState::Error);
        assert_eq!(status.upload_count, 0);
        assert_eq!(status.unavailable, vec![Parameter::Humidity]);
        assert_eq!(uploader.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_failures_leave_count_unchanged() {
        // ---
        let failures = [
            (UploadOutcome::RateLimited, OutcomeKind::RateLimited, "Rate limit"),
            (
                UploadOutcome::AuthError { message: "HTTP 401: ".to_string() },
                OutcomeKind::AuthError,
                "Authentication failed",
            ),
            (
                UploadOutcome::NetworkError { message: "Request timed out after 30s".to_string() },
                OutcomeKind::NetworkError,
                "timed out",
            ),
            (
                UploadOutcome::Rejected { status: 500, message: "boom".to_string() },
                OutcomeKind::Rejected,
                "HTTP 500",
            ),
        ];

        for (outcome, kind, needle) in failures {
            let coordinator = Coordinator::new(
                settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
                registry_with_temperature().await,
                Arc::new(FakeUploader::new(outcome)),
            );

            let next = in_ten_minutes();
            coordinator.run_cycle(TriggerKind::Scheduled, next).await;

            let status = coordinator.status();
            assert_eq!(status.state, StatusState::Error);
            assert_eq!(status.last_outcome, Some(kind));
            assert_eq!(status.upload_count, 0);
            assert_eq!(status.next_upload, Some(next));
            let last_error = status.last_error.unwrap();
            assert!(last_error.contains(needle), "{last_error:?} should mention {needle:?}");
        }
    }

    #[tokio::test]
    async fn test_debug_mode_records_sent_data_without_credentials() {
        // ---
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, true),
            registry_with_temperature().await,
            Arc::new(FakeUploader::new(UploadOutcome::Success)),
        );

        coordinator.run_cycle(TriggerKind::Manual, in_ten_minutes()).await;

        let sent = coordinator.status().last_sent_data.unwrap();
        assert_eq!(sent.get("tempf").map(String::as_str), Some("72.5"));
        assert!(!sent.contains_key("siteid"));
        assert!(!sent.contains_key("siteAuthenticationKey"));
    }

    #[tokio::test]
    async fn test_first_cycle_runs_at_startup_and_schedules_next() {
        // ---
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            Arc::new(FakeUploader::new(UploadOutcome::RateLimited)),
        );

        let started = Utc::now();
        let (handle, task) = coordinator.spawn();
        let mut rx = handle.subscribe();
        let status = rx
            .wait_for(|s| s.last_outcome.is_some())
            .await
            .unwrap()
            .clone();

        assert_eq!(status.state, StatusState::Error);
        assert!(status.last_error.unwrap().contains("Rate limit"));
        // Normal interval, no shortened retry
        let next = status.next_upload.unwrap();
        assert!(next >= started + chrono::Duration::seconds(599));
        assert!(next <= Utc::now() + chrono::Duration::seconds(601));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_triggers_never_run_concurrently() {
        // ---
        let gate = Arc::new(Notify::new());
        let uploader = Arc::new(FakeUploader::gated(UploadOutcome::Success, gate.clone()));
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            uploader.clone(),
        );

        let (handle, task) = coordinator.spawn();

        // Startup cycle is now held open inside the uploader
        wait_until(|| uploader.calls() == 1).await;

        assert_eq!(handle.trigger_now(), TriggerResult::Queued);
        assert_eq!(handle.trigger_now(), TriggerResult::Coalesced);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(uploader.calls(), 1, "only one request during the overlap window");

        // Release the first request; the queued trigger runs afterwards
        gate.notify_one();
        wait_until(|| uploader.calls() == 2).await;
        gate.notify_one();

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.upload_count == 2).await.unwrap();
        assert_eq!(uploader.max_in_flight.load(Ordering::SeqCst), 1);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_trigger_keeps_schedule_baseline() {
        // ---
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            Arc::new(FakeUploader::new(UploadOutcome::Success)),
        );

        let (handle, task) = coordinator.spawn();
        let mut rx = handle.subscribe();
        let scheduled = rx.wait_for(|s| s.upload_count == 1).await.unwrap().next_upload.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.trigger_now(), TriggerResult::Queued);
        let manual = rx.wait_for(|s| s.upload_count == 2).await.unwrap().next_upload.unwrap();

        let drift = (manual - scheduled).num_milliseconds().abs();
        assert!(drift < 50, "manual trigger moved the schedule by {drift}ms");

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_abandons_in_flight_cycle() {
        // ---
        let gate = Arc::new(Notify::new());
        let uploader = Arc::new(FakeUploader::gated(UploadOutcome::Success, gate));
        let coordinator = Coordinator::new(
            settings(&[(Parameter::Temperature, "sensor.outdoor_temp")], MIN_INTERVAL, false),
            registry_with_temperature().await,
            uploader.clone(),
        );

        let (handle, task) = coordinator.spawn();
        wait_until(|| uploader.calls() == 1).await;

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("coordinator did not stop")
            .unwrap();

        assert_eq!(handle.trigger_now(), TriggerResult::Stopped);
        assert_eq!(handle.get_status().upload_count, 0);
    }
}
