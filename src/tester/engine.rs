use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::estimator::{self, format_hm};
use crate::inhibitor::{InhibitHandle, SleepInhibitor};
use crate::metrics::ProcessSampler;
use crate::power::{rounded_percent, PowerSnapshot, PowerSource};
use crate::reports::{DeviceMetadata, Report, ReportOutcome, ReportStore};
use crate::settings::TesterSettings;
use crate::utils::NarrativeLog;
use crate::workload::{WorkloadKind, Workloads};

use super::{LiveState, TestSession, TesterStatus};

/// Upper bound on a believable OS time-to-empty (ten years).
const MAX_OS_ESTIMATE_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    Charging,
    AlreadyRunning,
    NoBatteryReading,
    /// The coordinating task is gone.
    Unavailable,
}

impl fmt::Display for StartRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartRejection::Charging => f.write_str("Cannot start test while charging"),
            StartRejection::AlreadyRunning => f.write_str("Cannot start test: a test is already running"),
            StartRejection::NoBatteryReading => {
                f.write_str("Cannot start test: no battery reading available")
            }
            StartRejection::Unavailable => f.write_str("Tester is shut down"),
        }
    }
}

impl std::error::Error for StartRejection {}

/// Collaborators the engine drives.
pub struct EngineParts {
    pub settings: TesterSettings,
    pub power: Box<dyn PowerSource>,
    pub inhibitor: Box<dyn SleepInhibitor>,
    pub workloads: Box<dyn Workloads>,
    pub store: ReportStore,
    pub log: NarrativeLog,
}

/// The test lifecycle state machine.
///
/// Owns the session and the published state; every method is a synchronous
/// transition driven by the coordinating task (or directly by tests), with
/// `now` supplied by the caller.
pub struct TesterEngine {
    settings: TesterSettings,
    power: Box<dyn PowerSource>,
    inhibitor: Box<dyn SleepInhibitor>,
    workloads: Box<dyn Workloads>,
    store: ReportStore,
    log: NarrativeLog,
    sampler: ProcessSampler,
    device: DeviceMetadata,
    session: Option<TestSession>,
    inhibit_handle: Option<InhibitHandle>,
    last_percent: Option<i64>,
    battery_readable: bool,
    live: LiveState,
    publisher: watch::Sender<LiveState>,
}

impl TesterEngine {
    pub fn new(parts: EngineParts) -> Self {
        let reports = parts.store.load_all();
        let live = LiveState {
            last_report: reports.last().cloned(),
            reports,
            ..LiveState::default()
        };
        let (publisher, _) = watch::channel(live.clone());

        let engine = Self {
            settings: parts.settings,
            power: parts.power,
            inhibitor: parts.inhibitor,
            workloads: parts.workloads,
            store: parts.store,
            log: parts.log,
            sampler: ProcessSampler::new(),
            device: DeviceMetadata::current(),
            session: None,
            inhibit_handle: None,
            last_percent: None,
            battery_readable: true,
            live,
            publisher,
        };
        engine.note_unfinished_test();
        engine
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.publisher.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &TesterSettings {
        &self.settings
    }

    /// Ambient poll: refreshes the live snapshot, logs whole-percent changes,
    /// checkpoints on bucket crossings or at the critical floor, and aborts a
    /// running test once the floor is reached.
    pub fn poll_power(&mut self, now: DateTime<Utc>) {
        let Some(snapshot) = self.read_power(now) else {
            self.publish();
            return;
        };

        let fraction = snapshot.fraction_charged;
        let percent = snapshot.rounded_percent();
        let critical = fraction <= self.settings.critical_floor;

        if let Some(previous) = self.last_percent.replace(percent) {
            if previous != percent {
                self.log.line(format!("Battery level changed: {percent}%"));

                let width = self.settings.bucket_width.max(1);
                let crossed_bucket = previous.div_euclid(width) != percent.div_euclid(width);
                if crossed_bucket || critical {
                    self.checkpoint(now);
                }
            }
        }

        if critical && self.session.is_some() {
            self.log
                .line("Critical battery level reached! Saving final report...");
            self.live.status = TesterStatus::Aborting;
            self.publish();
            self.finish(now, ReportOutcome::CriticalAbort);
            return;
        }

        self.publish();
    }

    pub fn start_test(
        &mut self,
        workload: WorkloadKind,
        now: DateTime<Utc>,
    ) -> Result<(), StartRejection> {
        if self.session.is_some() {
            return Err(self.reject(StartRejection::AlreadyRunning));
        }
        let Some(snapshot) = self.live.snapshot.clone() else {
            return Err(self.reject(StartRejection::NoBatteryReading));
        };
        if snapshot.is_charging {
            return Err(self.reject(StartRejection::Charging));
        }

        let os_estimate_secs = snapshot
            .os_estimated_seconds_remaining
            .unwrap_or(0)
            .min(MAX_OS_ESTIMATE_SECS);
        let initial_estimated_end_time = Duration::try_seconds(os_estimate_secs as i64)
            .and_then(|remaining| now.checked_add_signed(remaining))
            .unwrap_or(now);

        self.session = Some(TestSession {
            id: Uuid::new_v4().to_string(),
            workload,
            start_time: now,
            initial_fraction_charged: snapshot.fraction_charged,
            initial_estimated_end_time,
            initial_estimated_duration_secs: os_estimate_secs as f64,
            ticks: 0,
        });

        self.log.line(format!(
            "Starting battery test with workload: {}",
            workload.description()
        ));
        self.log.line(format!(
            "Battery level at start: {}%",
            snapshot.rounded_percent()
        ));
        self.log.line(format!(
            "Estimated time remaining: {}",
            format_hm(os_estimate_secs as f64)
        ));

        self.inhibit_handle = self.inhibitor.acquire(&self.settings.sleep_reason);
        if self.inhibit_handle.is_none() {
            self.log
                .line("Could not prevent idle sleep; the test continues without it");
        }
        self.workloads.start(workload);
        self.sampler.reset();

        self.live.status = TesterStatus::Running;
        self.live.workload = Some(workload);
        self.live.test_started_at = Some(now);
        self.live.test_elapsed_secs = 0.0;
        self.live.drop_per_minute = 0.0;
        self.live.extrapolated_full_discharge_secs = 0.0;
        self.live.initial_estimated_end_time = Some(initial_estimated_end_time);
        self.live.initial_estimated_duration_secs = os_estimate_secs as f64;
        self.live.estimated_end_time = Some(initial_estimated_end_time);
        self.publish();

        Ok(())
    }

    /// One sampling tick of a running test. No-op when idle.
    pub fn sample_tick(&mut self, now: DateTime<Utc>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.ticks += 1;
        let ticks = session.ticks;
        let initial = session.initial_fraction_charged;
        let elapsed_secs = (now - session.start_time).num_milliseconds().max(0) as f64 / 1000.0;

        self.live.test_elapsed_secs = elapsed_secs;

        if let Some(current) = self.live.fraction_charged() {
            let estimate = estimator::estimate(initial, current, elapsed_secs, now);
            self.live.drop_per_minute = estimate.drop_per_minute;
            self.live.extrapolated_full_discharge_secs = estimate.extrapolated_full_discharge_secs;
            if estimate.has_rate() {
                self.live.estimated_end_time = estimate.estimated_end_time;
            }
        }

        let every = self.settings.summary_every_ticks.max(1);
        if ticks % every == 0 {
            self.log_progress(elapsed_secs);
        }

        self.publish();
    }

    /// Ends the running test and persists its report. `None` when idle.
    pub fn stop_test(&mut self, now: DateTime<Utc>) -> Option<Report> {
        self.finish(now, ReportOutcome::Completed)
    }

    fn finish(&mut self, now: DateTime<Utc>, outcome: ReportOutcome) -> Option<Report> {
        let session = self.session.take()?;

        // The report must carry the latest reading, not the last ambient one.
        if outcome == ReportOutcome::Completed {
            self.read_power(now);
        }

        let final_fraction = self
            .live
            .fraction_charged()
            .unwrap_or(session.initial_fraction_charged);
        let battery = self
            .live
            .snapshot
            .as_ref()
            .map(|s| s.battery.clone())
            .unwrap_or_default();

        let report = Report::new(
            outcome,
            session.start_time,
            now,
            session.initial_fraction_charged,
            final_fraction,
            session.workload,
            session.initial_estimated_end_time,
            session.initial_estimated_duration_secs,
        )
        .with_test_id(&session.id)
        .with_battery(battery)
        .with_device(self.device.clone());

        let drop_per_minute = report.drop_per_minute();
        self.log.line("Test completed");
        self.log.line(format!(
            "Final battery level: {}%",
            rounded_percent(final_fraction)
        ));
        self.log
            .line(format!("Test duration: {}", format_hm(report.duration_secs())));
        self.log
            .line(format!("Battery drop: {:.1}%", report.percentage_drop()));
        self.log
            .line(format!("Drop per minute: {drop_per_minute:.2}%"));
        self.log.line(format!(
            "Extrapolated full battery time: {}",
            format_hm(estimator::extrapolate_full_discharge_secs(drop_per_minute))
        ));

        match self.store.append(report.clone()) {
            Ok(reports) => self.live.reports = reports,
            Err(err) => {
                self.log.line(format!("Failed to save report: {err:#}"));
                self.live.reports.push(report.clone());
            }
        }
        self.live.last_report = Some(report.clone());

        self.workloads.stop();
        if let Some(handle) = self.inhibit_handle.take() {
            self.inhibitor.release(handle);
        }

        self.live.clear_test();
        self.publish();

        Some(report)
    }

    fn read_power(&mut self, now: DateTime<Utc>) -> Option<PowerSnapshot> {
        let Some(snapshot) = self.power.poll() else {
            if self.battery_readable {
                self.log.line("Failed to read battery state");
            }
            self.battery_readable = false;
            return None;
        };

        if !self.battery_readable {
            self.log.line("Battery readings resumed");
        }
        self.battery_readable = true;

        self.live.snapshot = Some(snapshot.clone());
        self.live.snapshot_time = Some(now);
        Some(snapshot)
    }

    fn checkpoint(&mut self, now: DateTime<Utc>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(snapshot) = self.live.snapshot.as_ref() else {
            return;
        };

        let report = Report::new(
            ReportOutcome::Intermediate,
            session.start_time,
            now,
            session.initial_fraction_charged,
            snapshot.fraction_charged,
            session.workload,
            session.initial_estimated_end_time,
            session.initial_estimated_duration_secs,
        )
        .with_test_id(&session.id)
        .with_battery(snapshot.battery.clone())
        .with_device(self.device.clone());

        match self.store.write_intermediate(&report) {
            Ok(()) => self.log.line(format!(
                "Saved intermediate report at {}% battery level",
                snapshot.rounded_percent()
            )),
            Err(err) => self
                .log
                .line(format!("Failed to save intermediate report: {err:#}")),
        }
    }

    fn log_progress(&mut self, elapsed_secs: f64) {
        let level = self
            .live
            .fraction_charged()
            .map(rounded_percent)
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "unknown".into());
        let usage = self.sampler.sample();

        self.log
            .line(format!("Test running for: {}", format_hm(elapsed_secs)));
        self.log.line(format!("Current battery level: {level}"));
        self.log.line(format!(
            "Drop per minute: {:.2}%",
            self.live.drop_per_minute
        ));
        self.log.line(format!(
            "Extrapolated full battery time: {}",
            format_hm(self.live.extrapolated_full_discharge_secs)
        ));
        self.log.line(format!(
            "Process load: {:.1}% CPU, {:.0} MB",
            usage.cpu_percent, usage.memory_mb
        ));
    }

    fn reject(&self, reason: StartRejection) -> StartRejection {
        self.log.line(reason.to_string());
        reason
    }

    /// A checkpoint whose test never reached history means the last run died
    /// mid-test. It stays in its slot for inspection.
    fn note_unfinished_test(&self) {
        let Some(checkpoint) = self.store.load_intermediate() else {
            return;
        };
        let finished = self
            .live
            .reports
            .iter()
            .any(|report| report.test_id == checkpoint.test_id);
        if !finished {
            self.log.line(format!(
                "Found unfinished {} test started {}: last checkpoint at {}% after {}",
                checkpoint.workload.description(),
                checkpoint.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
                rounded_percent(checkpoint.final_fraction_charged),
                format_hm(checkpoint.duration_secs())
            ));
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.live.clone());
    }
}

impl Drop for TesterEngine {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.stop_test(Utc::now());
        }
    }
}
