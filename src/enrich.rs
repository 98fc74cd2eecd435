use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use utoipa::ToSchema;

use crate::source::{GeoPoint, StateFrame};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this barometric altitude (m) a near-zero vertical rate reads as taxiing.
const TAXI_ALTITUDE_M: f64 = 500.0;
/// Vertical rate (m/s) under which a low aircraft is still considered on the ground.
const TAXI_VERTICAL_RATE: f64 = 1.0;
/// Roughly 500 fpm.
const CLIMB_DESCENT_RATE: f64 = 2.5;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlightPhase {
    Ground,
    Climb,
    Cruise,
    Descent,
    Unknown,
}

impl FlightPhase {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ground" => Some(FlightPhase::Ground),
            "climb" => Some(FlightPhase::Climb),
            "cruise" => Some(FlightPhase::Cruise),
            "descent" => Some(FlightPhase::Descent),
            "unknown" => Some(FlightPhase::Unknown),
            _ => None,
        }
    }
}

/// A frame plus the fields derived from it at ingestion time.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedFrame {
    pub frame: StateFrame,
    pub distance_km: Option<f64>,
    pub flight_phase: FlightPhase,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Coarse flight phase from the ground flag, vertical rate (m/s) and
/// barometric altitude (m). Rates within ±2.5 m/s count as level flight.
pub fn detect_flight_phase(
    on_ground: bool,
    vertical_rate: Option<f64>,
    baro_altitude: Option<f64>,
) -> FlightPhase {
    if on_ground {
        return FlightPhase::Ground;
    }

    if let Some(altitude) = baro_altitude {
        if altitude < TAXI_ALTITUDE_M
            && vertical_rate.map_or(true, |vr| vr.abs() < TAXI_VERTICAL_RATE)
        {
            return FlightPhase::Ground;
        }
    }

    match vertical_rate {
        None => FlightPhase::Unknown,
        Some(vr) if vr > CLIMB_DESCENT_RATE => FlightPhase::Climb,
        Some(vr) if vr < -CLIMB_DESCENT_RATE => FlightPhase::Descent,
        Some(_) => FlightPhase::Cruise,
    }
}

pub fn enrich(frame: StateFrame, observer: Option<GeoPoint>) -> EnrichedFrame {
    let distance_km = match (observer, frame.position) {
        (Some(observer), Some(position)) => Some(haversine_km(observer, position)),
        _ => None,
    };
    let flight_phase = detect_flight_phase(frame.on_ground, frame.vertical_rate, frame.baro_altitude);

    EnrichedFrame {
        frame,
        distance_km,
        flight_phase,
    }
}
