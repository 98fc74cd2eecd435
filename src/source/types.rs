use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Rough length of one degree of latitude, in kilometres.
pub const KM_PER_DEGREE: f64 = 111.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parses `"lat,lon"`.
    pub fn from_coordinates(coordinates: &str) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return None;
        }
        let lat = parts[0].parse().ok()?;
        let lon = parts[1].parse().ok()?;
        Some(Self::new(lat, lon))
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Rectangular lat/lon query region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Box around `center` reaching `radius_km` in each direction.
    ///
    /// Uses a flat 111 km per degree and widens the longitude span by
    /// `1 / cos(lat)`. Good for radii up to a few hundred kilometres; the
    /// longitude span blows up close to the poles.
    pub fn from_center_radius(center: GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lon_delta = radius_km / (KM_PER_DEGREE * center.latitude.to_radians().cos().abs());

        Self {
            lat_min: center.latitude - lat_delta,
            lat_max: center.latitude + lat_delta,
            lon_min: center.longitude - lon_delta,
            lon_max: center.longitude + lon_delta,
        }
    }

    pub fn query_params(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.lat_min),
            ("lamax", self.lat_max),
            ("lomin", self.lon_min),
            ("lomax", self.lon_max),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    AdsB,
    Asterix,
    Mlat,
    Flarm,
}

impl PositionSource {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(PositionSource::AdsB),
            1 => Some(PositionSource::Asterix),
            2 => Some(PositionSource::Mlat),
            3 => Some(PositionSource::Flarm),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            PositionSource::AdsB => 0,
            PositionSource::Asterix => 1,
            PositionSource::Mlat => 2,
            PositionSource::Flarm => 3,
        }
    }
}

/// One telemetry sample for one aircraft. Altitudes in metres, speeds in m/s,
/// timestamps in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StateFrame {
    pub object_id: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub time_position: Option<i64>,
    pub last_contact: Option<i64>,
    pub position: Option<GeoPoint>,
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    pub velocity: Option<f64>,
    pub true_track: Option<f64>,
    pub vertical_rate: Option<f64>,
    pub geo_altitude: Option<f64>,
    pub squawk: Option<String>,
    pub spi: bool,
    pub position_source: Option<PositionSource>,
}

impl StateFrame {
    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceQuery {
    Area(BoundingBox),
    Ids(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateBatch {
    /// Source snapshot time, unix seconds.
    pub server_time: i64,
    pub frames: Vec<StateFrame>,
}
