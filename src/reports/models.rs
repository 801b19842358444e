use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::power::BatteryMetadata;
use crate::workload::WorkloadKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReportOutcome {
    /// Stopped on request.
    Completed,
    /// Terminated because the battery reached the critical floor.
    CriticalAbort,
    /// Recovery checkpoint of a test still in progress.
    Intermediate,
}

impl ReportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportOutcome::Completed => "Completed",
            ReportOutcome::CriticalAbort => "CriticalAbort",
            ReportOutcome::Intermediate => "Intermediate",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    pub host_name: Option<String>,
    pub os_version: Option<String>,
}

impl DeviceMetadata {
    pub fn current() -> Self {
        Self {
            host_name: sysinfo::System::host_name(),
            os_version: sysinfo::System::long_os_version(),
        }
    }
}

/// Immutable summary of one test, completed or in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    /// Identifies the test run; checkpoints and the final report share it.
    #[serde(default)]
    pub test_id: String,
    pub outcome: ReportOutcome,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub initial_fraction_charged: f64,
    pub final_fraction_charged: f64,
    pub workload: WorkloadKind,
    pub initial_estimated_end_time: DateTime<Utc>,
    pub initial_estimated_duration_secs: f64,
    #[serde(default)]
    pub battery: BatteryMetadata,
    #[serde(default)]
    pub device: DeviceMetadata,
}

impl Report {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        outcome: ReportOutcome,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        initial_fraction_charged: f64,
        final_fraction_charged: f64,
        workload: WorkloadKind,
        initial_estimated_end_time: DateTime<Utc>,
        initial_estimated_duration_secs: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: String::new(),
            outcome,
            start_time,
            // A clock step backwards must not produce a negative duration.
            end_time: end_time.max(start_time),
            initial_fraction_charged,
            final_fraction_charged,
            workload,
            initial_estimated_end_time,
            initial_estimated_duration_secs,
            battery: BatteryMetadata::default(),
            device: DeviceMetadata::default(),
        }
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = test_id.into();
        self
    }

    pub fn with_battery(mut self, battery: BatteryMetadata) -> Self {
        self.battery = battery;
        self
    }

    pub fn with_device(mut self, device: DeviceMetadata) -> Self {
        self.device = device;
        self
    }

    pub fn percentage_drop(&self) -> f64 {
        (self.initial_fraction_charged - self.final_fraction_charged) * 100.0
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// Percentage points lost per hour; zero for a zero-length test.
    pub fn drain_rate_per_hour(&self) -> f64 {
        let hours = self.duration_secs() / 3600.0;
        if hours > 0.0 {
            self.percentage_drop() / hours
        } else {
            0.0
        }
    }

    pub fn drop_per_minute(&self) -> f64 {
        self.drain_rate_per_hour() / 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn report(initial: f64, final_: f64, secs: i64) -> Report {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        Report::new(
            ReportOutcome::Completed,
            start,
            start + Duration::seconds(secs),
            initial,
            final_,
            WorkloadKind::HeavyLoad,
            start + Duration::hours(5),
            5.0 * 3600.0,
        )
    }

    #[test]
    fn one_hour_twenty_points() {
        let report = report(0.80, 0.60, 3600);

        assert!((report.percentage_drop() - 20.0).abs() < 1e-9);
        assert_eq!(report.duration_secs(), 3600.0);
        assert!((report.drain_rate_per_hour() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_has_zero_rate() {
        let report = report(0.80, 0.79, 0);
        assert_eq!(report.drain_rate_per_hour(), 0.0);
    }

    #[test]
    fn end_never_precedes_start() {
        let report = report(0.80, 0.79, -30);
        assert!(report.end_time >= report.start_time);
        assert_eq!(report.duration_secs(), 0.0);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(report(0.5, 0.4, 10).id, report(0.5, 0.4, 10).id);
    }

    #[test]
    fn history_without_test_ids_still_loads() {
        let mut json = serde_json::to_value(report(0.9, 0.8, 60)).unwrap();
        json.as_object_mut().unwrap().remove("testId");

        let loaded: Report = serde_json::from_value(json).unwrap();
        assert!(loaded.test_id.is_empty());
    }

    #[test]
    fn serialized_shape_is_camel_case() {
        let json = serde_json::to_value(report(0.9, 0.8, 60)).unwrap();
        assert_eq!(json["workload"], "heavyLoad");
        assert_eq!(json["outcome"], "completed");
        assert!(json["initialFractionCharged"].is_number());
        assert!(json["battery"]["voltageVolts"].is_null());
    }
}
