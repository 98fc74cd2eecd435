use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, IntoStaticStr};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
    Unknown,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "increasing" => Some(Trend::Increasing),
            "stable" => Some(Trend::Stable),
            "decreasing" => Some(Trend::Decreasing),
            "unknown" => Some(Trend::Unknown),
            _ => None,
        }
    }
}

/// Window statistics for one metric of one aircraft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct RollingStats {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AnalyticsResult {
    pub object_id: String,
    pub callsign: Option<String>,
    pub computed_at: DateTime<Utc>,
    pub total_samples: usize,
    pub window_samples: usize,
    pub altitude: Option<RollingStats>,
    pub speed: Option<RollingStats>,
    pub vertical_rate: Option<RollingStats>,
    pub heading: Option<RollingStats>,
    pub altitude_trend: Trend,
    pub speed_trend: Trend,
    pub is_altitude_anomaly: bool,
    pub is_speed_anomaly: bool,
    pub is_vertical_rate_anomaly: bool,
    pub anomaly_reasons: Vec<String>,
}

impl AnalyticsResult {
    pub fn has_anomaly(&self) -> bool {
        self.is_altitude_anomaly || self.is_speed_anomaly || self.is_vertical_rate_anomaly
    }
}

/// Cross-sectional summary of one metric over the airborne fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FleetStatistics {
    pub count: usize,
    pub altitude: Option<MetricSummary>,
    pub speed: Option<MetricSummary>,
    pub by_phase: BTreeMap<String, usize>,
    pub anomaly_count: usize,
}
