use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::analytics::Trend;
use crate::enrich::FlightPhase;
use crate::storage::CurrentState;

/// Display-ready view of one current state row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CachedFlight {
    pub object_id: String,
    /// Callsign, or the upper-case id when none was reported.
    pub callsign: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distance_km: Option<f64>,
    pub altitude_m: Option<f64>,
    pub velocity_mps: Option<f64>,
    pub vertical_rate_mps: Option<f64>,
    pub heading: Option<i64>,
    pub altitude_ft: Option<i64>,
    pub flight_level: Option<String>,
    pub speed_kts: Option<i64>,
    pub vertical_rate_fpm: Option<i64>,
    pub on_ground: bool,
    pub flight_phase: FlightPhase,
    pub speed_trend: Option<Trend>,
    pub altitude_trend: Option<Trend>,
    pub is_anomaly: bool,
    pub is_stale: bool,
    pub last_contact: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

impl CachedFlight {
    pub fn from_state(state: &CurrentState, cached_at: DateTime<Utc>) -> Self {
        Self {
            object_id: state.object_id.clone(),
            callsign: state.display_callsign(),
            latitude: state.latitude,
            longitude: state.longitude,
            distance_km: state.distance_km,
            altitude_m: state.baro_altitude,
            velocity_mps: state.velocity,
            vertical_rate_mps: state.vertical_rate,
            heading: state.heading_display(),
            altitude_ft: state.altitude_ft(),
            flight_level: state.flight_level(),
            speed_kts: state.speed_kts(),
            vertical_rate_fpm: state.vertical_rate_fpm(),
            on_ground: state.on_ground,
            flight_phase: state.flight_phase,
            speed_trend: state.speed_trend,
            altitude_trend: state.altitude_trend,
            is_anomaly: state.is_anomaly,
            is_stale: state.is_stale(cached_at),
            last_contact: state.last_contact,
            updated_at: state.updated_at,
            cached_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: i64,
    pub hits: u64,
    pub misses: u64,
    /// Hits over lookups, 0 before the first lookup.
    pub hit_rate: f64,
    pub last_refresh: Option<DateTime<Utc>>,
}
