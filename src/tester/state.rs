use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::power::PowerSnapshot;
use crate::reports::Report;
use crate::workload::WorkloadKind;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TesterStatus {
    #[default]
    Idle,
    Running,
    /// Critical floor reached; the final report is being written.
    Aborting,
}

/// Mutable record of the test in progress. Only the engine touches it.
#[derive(Debug, Clone)]
pub struct TestSession {
    /// Shared by every checkpoint and the final report of this test.
    pub id: String,
    pub workload: WorkloadKind,
    pub start_time: DateTime<Utc>,
    pub initial_fraction_charged: f64,
    pub initial_estimated_end_time: DateTime<Utc>,
    pub initial_estimated_duration_secs: f64,
    pub ticks: u64,
}

/// Everything a presentation layer may read. Published as a whole after
/// every engine transition.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub status: TesterStatus,
    pub snapshot: Option<PowerSnapshot>,
    pub snapshot_time: Option<DateTime<Utc>>,
    pub workload: Option<WorkloadKind>,
    pub test_started_at: Option<DateTime<Utc>>,
    pub test_elapsed_secs: f64,
    pub drop_per_minute: f64,
    pub extrapolated_full_discharge_secs: f64,
    pub estimated_end_time: Option<DateTime<Utc>>,
    pub initial_estimated_end_time: Option<DateTime<Utc>>,
    pub initial_estimated_duration_secs: f64,
    pub last_report: Option<Report>,
    pub reports: Vec<Report>,
}

impl LiveState {
    pub fn test_in_progress(&self) -> bool {
        self.status != TesterStatus::Idle
    }

    pub fn fraction_charged(&self) -> Option<f64> {
        self.snapshot.as_ref().map(|s| s.fraction_charged)
    }

    pub fn is_charging(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_charging)
    }

    pub fn os_estimated_seconds_remaining(&self) -> Option<u64> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.os_estimated_seconds_remaining)
    }

    pub(crate) fn clear_test(&mut self) {
        self.status = TesterStatus::Idle;
        self.workload = None;
        self.test_started_at = None;
        self.test_elapsed_secs = 0.0;
        self.drop_per_minute = 0.0;
        self.extrapolated_full_discharge_secs = 0.0;
        self.estimated_end_time = None;
        self.initial_estimated_end_time = None;
        self.initial_estimated_duration_secs = 0.0;
    }
}
