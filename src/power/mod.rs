mod reader;

pub use reader::SystemPowerSource;

use serde::{Deserialize, Serialize};

/// One point-in-time reading of the internal battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSnapshot {
    /// `current_capacity / max_capacity`, clamped to `[0, 1]`.
    pub fraction_charged: f64,
    pub is_charging: bool,
    /// The OS's own time-to-empty estimate. `None` while the OS is still
    /// calculating or when on external power.
    pub os_estimated_seconds_remaining: Option<u64>,
    #[serde(default)]
    pub battery: BatteryMetadata,
}

impl PowerSnapshot {
    /// Normalizes raw capacity figures. Returns `None` when the descriptor is
    /// unusable (zero, negative or non-finite maximum).
    pub fn from_capacity(
        current_capacity: f64,
        max_capacity: f64,
        is_charging: bool,
        os_estimated_seconds_remaining: Option<u64>,
    ) -> Option<Self> {
        if !current_capacity.is_finite() || !max_capacity.is_finite() || max_capacity <= 0.0 {
            return None;
        }

        Some(Self {
            fraction_charged: (current_capacity / max_capacity).clamp(0.0, 1.0),
            is_charging,
            os_estimated_seconds_remaining,
            battery: BatteryMetadata::default(),
        })
    }

    pub fn with_battery(mut self, battery: BatteryMetadata) -> Self {
        self.battery = battery;
        self
    }

    /// Whole percentage used for change detection and bucket checkpoints.
    pub fn rounded_percent(&self) -> i64 {
        rounded_percent(self.fraction_charged)
    }
}

pub fn rounded_percent(fraction: f64) -> i64 {
    (fraction * 100.0).round() as i64
}

/// Battery descriptors the OS may or may not expose. Anything the platform
/// does not report stays `None` and serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryMetadata {
    pub temperature_celsius: Option<f64>,
    pub cycle_count: Option<u32>,
    pub voltage_volts: Option<f64>,
    pub energy_rate_watts: Option<f64>,
    pub energy_full_wh: Option<f64>,
    pub energy_full_design_wh: Option<f64>,
    pub state_of_health: Option<f64>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub technology: Option<String>,
}

/// Source of battery readings. Implementations never fail hard: any OS error,
/// missing battery or malformed descriptor yields `None`.
pub trait PowerSource: Send {
    fn poll(&mut self) -> Option<PowerSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_capacity_ratio() {
        let snapshot = PowerSnapshot::from_capacity(83.0, 100.0, false, Some(3600)).unwrap();
        assert!((snapshot.fraction_charged - 0.83).abs() < 1e-9);
        assert_eq!(snapshot.rounded_percent(), 83);
        assert_eq!(snapshot.os_estimated_seconds_remaining, Some(3600));
    }

    #[test]
    fn fraction_is_clamped() {
        let over = PowerSnapshot::from_capacity(5200.0, 5000.0, true, None).unwrap();
        assert_eq!(over.fraction_charged, 1.0);

        let under = PowerSnapshot::from_capacity(-3.0, 5000.0, false, None).unwrap();
        assert_eq!(under.fraction_charged, 0.0);
    }

    #[test]
    fn unusable_descriptor_produces_no_snapshot() {
        assert!(PowerSnapshot::from_capacity(50.0, 0.0, false, None).is_none());
        assert!(PowerSnapshot::from_capacity(f64::NAN, 100.0, false, None).is_none());
        assert!(PowerSnapshot::from_capacity(50.0, f64::INFINITY, false, None).is_none());
    }

    #[test]
    fn missing_metadata_serializes_as_null() {
        let snapshot = PowerSnapshot::from_capacity(1.0, 2.0, false, None).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["battery"]["cycleCount"].is_null());
        assert!(json["battery"]["temperatureCelsius"].is_null());
    }
}
