use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// This process's footprint at one instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}
