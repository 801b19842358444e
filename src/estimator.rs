//! Discharge-rate model derived from percentage-granularity battery readings.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Slack for float error in `(initial - current) * 100`.
const WHOLE_POINT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeEstimate {
    pub total_drop_percent: f64,
    /// Percentage points lost per minute. Zero until a whole point has dropped.
    pub drop_per_minute: f64,
    /// Time a full 100% battery would last at the current rate; zero when unknown.
    pub extrapolated_full_discharge_secs: f64,
    /// When the battery is expected to run out at the current rate.
    pub estimated_end_time: Option<DateTime<Utc>>,
}

impl DischargeEstimate {
    pub fn has_rate(&self) -> bool {
        self.drop_per_minute > 0.0
    }
}

/// Computes the live discharge model.
///
/// Readings are noisy at sub-percent granularity, so every rate-derived
/// quantity stays zero (or `None`) until the charge has actually fallen by
/// at least one whole percentage point since the start of the test.
pub fn estimate(
    initial_fraction: f64,
    current_fraction: f64,
    elapsed_secs: f64,
    now: DateTime<Utc>,
) -> DischargeEstimate {
    let minutes_elapsed = elapsed_secs.max(0.0) / 60.0;
    let total_drop_percent = (initial_fraction - current_fraction) * 100.0;

    let whole_point_lost = total_drop_percent >= 1.0 - WHOLE_POINT_EPSILON;
    let drop_per_minute = if minutes_elapsed > 0.0 && whole_point_lost {
        total_drop_percent / minutes_elapsed
    } else {
        0.0
    };

    let extrapolated_full_discharge_secs = extrapolate_full_discharge_secs(drop_per_minute);

    let estimated_end_time = (drop_per_minute > 0.0).then(|| {
        let remaining_minutes = current_fraction * 100.0 / drop_per_minute;
        now + Duration::milliseconds((remaining_minutes * 60_000.0).round() as i64)
    });

    DischargeEstimate {
        total_drop_percent,
        drop_per_minute,
        extrapolated_full_discharge_secs,
        estimated_end_time,
    }
}

/// `(100 * 60) / drop_per_minute`, or zero for a non-positive rate.
pub fn extrapolate_full_discharge_secs(drop_per_minute: f64) -> f64 {
    if drop_per_minute > 0.0 {
        (100.0 * 60.0) / drop_per_minute
    } else {
        0.0
    }
}

/// Formats a duration as `"<h>h <m>m"`, the shape used throughout the test log.
pub fn format_hm(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    format!("{}h {}m", total / 3600, total / 60 % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn ten_points_in_ten_minutes() {
        let estimate = estimate(1.00, 0.90, 600.0, at(600));

        assert!((estimate.drop_per_minute - 1.0).abs() < 1e-9);
        assert!((estimate.total_drop_percent - 10.0).abs() < 1e-9);
        assert!((estimate.extrapolated_full_discharge_secs - 6000.0).abs() < 1e-6);
    }

    #[test]
    fn drop_of_ten_percent_per_minute_extrapolates_to_ten_minutes() {
        // 10 points over one minute.
        let estimate = estimate(1.00, 0.90, 60.0, at(60));

        assert!((estimate.drop_per_minute - 10.0).abs() < 1e-9);
        assert!((estimate.extrapolated_full_discharge_secs - 600.0).abs() < 1e-6);
    }

    #[test]
    fn zero_elapsed_means_zero_rate() {
        let estimate = estimate(0.8, 0.7, 0.0, at(0));

        assert_eq!(estimate.drop_per_minute, 0.0);
        assert_eq!(estimate.extrapolated_full_discharge_secs, 0.0);
        assert!(estimate.estimated_end_time.is_none());
    }

    #[test]
    fn sub_percent_noise_is_ignored() {
        let estimate = estimate(0.804, 0.801, 120.0, at(120));

        assert_eq!(estimate.drop_per_minute, 0.0);
        assert!(!estimate.has_rate());
        assert!(estimate.estimated_end_time.is_none());
    }

    #[test]
    fn drop_across_a_rounding_edge_is_still_noise() {
        // 80.51% rounds to 81 and 80.49% to 80, but only 0.02 points were lost.
        let estimate = estimate(0.8051, 0.8049, 60.0, at(60));

        assert_eq!(estimate.drop_per_minute, 0.0);
        assert_eq!(estimate.extrapolated_full_discharge_secs, 0.0);
        assert!(estimate.estimated_end_time.is_none());
    }

    #[test]
    fn exactly_one_point_yields_a_rate() {
        let estimate = estimate(0.55, 0.54, 60.0, at(60));

        assert!(estimate.has_rate());
        assert!((estimate.drop_per_minute - 1.0).abs() < 1e-9);
    }

    #[test]
    fn charging_never_yields_a_rate() {
        let estimate = estimate(0.50, 0.60, 600.0, at(600));

        assert_eq!(estimate.drop_per_minute, 0.0);
        assert_eq!(estimate.extrapolated_full_discharge_secs, 0.0);
    }

    #[test]
    fn end_time_extrapolates_remaining_charge() {
        // 20 points in 20 minutes, 60% left => 60 more minutes.
        let estimate = estimate(0.80, 0.60, 1200.0, at(1200));

        let end = estimate.estimated_end_time.unwrap();
        assert_eq!((end - at(1200)).num_seconds(), 3600);
    }

    #[test]
    fn extrapolation_is_zero_for_non_positive_rates() {
        assert_eq!(extrapolate_full_discharge_secs(0.0), 0.0);
        assert_eq!(extrapolate_full_discharge_secs(-2.0), 0.0);
        assert_eq!(extrapolate_full_discharge_secs(2.0), 3000.0);
    }

    #[test]
    fn hours_and_minutes() {
        assert_eq!(format_hm(0.0), "0h 0m");
        assert_eq!(format_hm(3_725.0), "1h 2m");
        assert_eq!(format_hm(f64::INFINITY), "0h 0m");
    }
}
