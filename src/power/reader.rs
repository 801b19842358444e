use anyhow::{anyhow, Context, Result};
use battery::units::electric_potential::volt;
use battery::units::energy::watt_hour;
use battery::units::power::watt;
use battery::units::ratio::ratio;
use battery::units::thermodynamic_temperature::degree_celsius;
use battery::units::time::second;

use super::{BatteryMetadata, PowerSnapshot, PowerSource};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Reads the internal battery through the OS power-source facility
/// (IOKit on macOS, sysfs on Linux).
///
/// The platform manager is not `Send`, so a fresh one is opened per poll.
#[derive(Debug, Default)]
pub struct SystemPowerSource;

impl SystemPowerSource {
    pub fn new() -> Self {
        Self
    }

    fn read(&mut self) -> Result<PowerSnapshot> {
        let manager = battery::Manager::new().context("failed to open power source manager")?;
        let batteries = manager
            .batteries()
            .context("failed to list power sources")?;

        // First battery whose descriptor is complete wins; broken entries are skipped.
        for maybe_battery in batteries {
            let source = match maybe_battery {
                Ok(source) => source,
                Err(err) => {
                    log_warn!("skipping unreadable power source: {err}");
                    continue;
                }
            };

            let current = f64::from(source.energy().get::<watt_hour>());
            let max = f64::from(source.energy_full().get::<watt_hour>());
            let is_charging = matches!(source.state(), battery::State::Charging);
            let time_to_empty = source
                .time_to_empty()
                .map(|time| time.get::<second>())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs as u64);

            let Some(snapshot) = PowerSnapshot::from_capacity(current, max, is_charging, time_to_empty)
            else {
                log_warn!("skipping power source with malformed capacity ({current}/{max} Wh)");
                continue;
            };

            return Ok(snapshot.with_battery(metadata_of(&source)));
        }

        Err(anyhow!("no internal battery found"))
    }
}

impl PowerSource for SystemPowerSource {
    fn poll(&mut self) -> Option<PowerSnapshot> {
        match self.read() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log_warn!("power source query failed: {err:#}");
                None
            }
        }
    }
}

fn metadata_of(source: &battery::Battery) -> BatteryMetadata {
    let positive = |value: f32| {
        let value = f64::from(value);
        (value.is_finite() && value > 0.0).then_some(value)
    };

    BatteryMetadata {
        temperature_celsius: source
            .temperature()
            .map(|t| f64::from(t.get::<degree_celsius>())),
        cycle_count: source.cycle_count(),
        voltage_volts: positive(source.voltage().get::<volt>()),
        energy_rate_watts: positive(source.energy_rate().get::<watt>()),
        energy_full_wh: positive(source.energy_full().get::<watt_hour>()),
        energy_full_design_wh: positive(source.energy_full_design().get::<watt_hour>()),
        state_of_health: positive(source.state_of_health().get::<ratio>()),
        vendor: source.vendor().map(str::to_string),
        model: source.model().map(str::to_string),
        technology: Some(source.technology().to_string()).filter(|t| t != "unknown"),
    }
}
