use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::analytics::Trend;
use crate::enrich::FlightPhase;
use crate::source::PositionSource;

const FEET_PER_METRE: f64 = 3.28084;
const KNOTS_PER_MPS: f64 = 1.94384;
const FPM_PER_MPS: f64 = 196.85;
const FLIGHT_LEVEL_FLOOR_FT: i64 = 18_000;
const STALE_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Airborne,
}

/// One row of `current_state`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CurrentState {
    pub object_id: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub on_ground: bool,
    pub squawk: Option<String>,
    pub spi: bool,
    pub position_source: Option<PositionSource>,
    pub time_position: Option<i64>,
    pub last_contact: Option<i64>,
    pub flight_phase: FlightPhase,
    pub distance_km: Option<f64>,
    pub speed_trend: Option<Trend>,
    pub altitude_trend: Option<Trend>,
    pub is_anomaly: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn feet(metres: Option<f64>) -> Option<i64> {
    metres.map(|m| (m * FEET_PER_METRE) as i64)
}

fn knots(mps: Option<f64>) -> Option<i64> {
    mps.map(|v| (v * KNOTS_PER_MPS) as i64)
}

fn feet_per_minute(mps: Option<f64>) -> Option<i64> {
    mps.map(|v| (v * FPM_PER_MPS) as i64)
}

impl CurrentState {
    pub fn altitude_ft(&self) -> Option<i64> {
        feet(self.baro_altitude)
    }

    /// `FLnnn` once at or above the transition altitude.
    pub fn flight_level(&self) -> Option<String> {
        self.altitude_ft()
            .filter(|ft| *ft >= FLIGHT_LEVEL_FLOOR_FT)
            .map(|ft| format!("FL{}", ft / 100))
    }

    pub fn speed_kts(&self) -> Option<i64> {
        knots(self.velocity)
    }

    pub fn vertical_rate_fpm(&self) -> Option<i64> {
        feet_per_minute(self.vertical_rate)
    }

    pub fn heading_display(&self) -> Option<i64> {
        self.true_track.map(|t| (t as i64).rem_euclid(360))
    }

    pub fn display_callsign(&self) -> String {
        self.callsign
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .unwrap_or_else(|| self.object_id.to_uppercase())
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_contact {
            Some(last) => now.timestamp() - last > STALE_AFTER_SECS,
            None => true,
        }
    }
}

/// One row of `position_history`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistoryRecord {
    pub id: i64,
    pub object_id: String,
    pub callsign: Option<String>,
    /// Observation time, unix seconds.
    pub timestamp: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub on_ground: bool,
    pub position_source: Option<PositionSource>,
    pub distance_km: Option<f64>,
    /// Insertion time, unix milliseconds.
    pub created_at: i64,
}

impl HistoryRecord {
    pub fn altitude_ft(&self) -> Option<i64> {
        feet(self.baro_altitude)
    }

    pub fn speed_kts(&self) -> Option<i64> {
        knots(self.velocity)
    }

    pub fn vertical_rate_fpm(&self) -> Option<i64> {
        feet_per_minute(self.vertical_rate)
    }
}

/// Analytics fields written back onto a `current_state` row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsUpdate {
    pub object_id: String,
    pub altitude_trend: Trend,
    pub speed_trend: Trend,
    pub is_anomaly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state() -> CurrentState {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        CurrentState {
            object_id: "a1b2c3".into(),
            callsign: None,
            origin_country: None,
            latitude: Some(40.0),
            longitude: Some(-74.0),
            baro_altitude: Some(10_667.5),
            geo_altitude: None,
            velocity: Some(230.0),
            true_track: Some(-5.4),
            vertical_rate: Some(-7.62),
            on_ground: false,
            squawk: None,
            spi: false,
            position_source: None,
            time_position: None,
            last_contact: Some(at.timestamp() - 30),
            flight_phase: FlightPhase::Descent,
            distance_km: None,
            speed_trend: None,
            altitude_trend: None,
            is_anomaly: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn display_units() {
        let s = state();
        // 34 998.36 ft, truncated.
        assert_eq!(s.altitude_ft(), Some(34_998));
        assert_eq!(s.flight_level().as_deref(), Some("FL349"));
        assert_eq!(s.speed_kts(), Some(447));
        assert_eq!(s.vertical_rate_fpm(), Some(-1_499));
        assert_eq!(s.heading_display(), Some(355));
        assert_eq!(s.display_callsign(), "A1B2C3");
    }

    #[test]
    fn low_altitude_has_no_flight_level() {
        let mut s = state();
        s.baro_altitude = Some(1_000.0);
        assert_eq!(s.flight_level(), None);
    }

    #[test]
    fn staleness_uses_last_contact() {
        let mut s = state();
        let now = s.updated_at;
        assert!(!s.is_stale(now));
        assert!(s.is_stale(now + chrono::Duration::seconds(31)));
        s.last_contact = None;
        assert!(s.is_stale(now));
    }
}
