use serde::Deserialize;
use serde_json::Value;

use super::error::SourceError;
use super::types::{GeoPoint, PositionSource, StateBatch, StateFrame};

/// Fields in one positional frame of the `/states/all` response.
pub const FRAME_FIELDS: usize = 17;

// Field offsets within a frame.
const ID: usize = 0;
const CALLSIGN: usize = 1;
const ORIGIN_COUNTRY: usize = 2;
const TIME_POSITION: usize = 3;
const LAST_CONTACT: usize = 4;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;
const GEO_ALTITUDE: usize = 13;
const SQUAWK: usize = 14;
const SPI: usize = 15;
const POSITION_SOURCE: usize = 16;

#[derive(Debug, Deserialize)]
struct StatesResponse {
    time: Option<i64>,
    states: Option<Vec<Value>>,
}

/// Parses one raw frame. `None` when the frame is too short or has no id.
pub fn parse_frame(raw: &[Value]) -> Option<StateFrame> {
    if raw.len() < FRAME_FIELDS {
        return None;
    }

    let object_id = raw[ID].as_str().map(str::trim).filter(|s| !s.is_empty())?;

    let position = match (as_f64(&raw[LATITUDE]), as_f64(&raw[LONGITUDE])) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
        _ => None,
    };

    Some(StateFrame {
        object_id: object_id.to_lowercase(),
        callsign: as_text(&raw[CALLSIGN]),
        origin_country: as_text(&raw[ORIGIN_COUNTRY]),
        time_position: as_i64(&raw[TIME_POSITION]),
        last_contact: as_i64(&raw[LAST_CONTACT]),
        position,
        baro_altitude: as_f64(&raw[BARO_ALTITUDE]),
        on_ground: raw[ON_GROUND].as_bool().unwrap_or(false),
        velocity: as_f64(&raw[VELOCITY]),
        true_track: as_f64(&raw[TRUE_TRACK]),
        vertical_rate: as_f64(&raw[VERTICAL_RATE]),
        geo_altitude: as_f64(&raw[GEO_ALTITUDE]),
        squawk: as_text(&raw[SQUAWK]),
        spi: raw[SPI].as_bool().unwrap_or(false),
        position_source: as_i64(&raw[POSITION_SOURCE]).and_then(PositionSource::from_code),
    })
}

/// Parses a full `/states/all` body, keeping only frames with a position.
/// `fallback_time` is used when the body carries no `time`.
pub fn parse_states_response(body: &str, fallback_time: i64) -> Result<StateBatch, SourceError> {
    let response: StatesResponse = serde_json::from_str(body)?;
    let raw_states = response.states.unwrap_or_default();
    let received = raw_states.len();

    let frames: Vec<StateFrame> = raw_states
        .iter()
        .filter_map(|v| v.as_array())
        .filter_map(|arr| parse_frame(arr))
        .filter(StateFrame::has_position)
        .collect();

    log::debug!(
        "Parsed {} of {} state vectors with positions",
        frames.len(),
        received
    );

    Ok(StateBatch {
        server_time: response.time.unwrap_or(fallback_time),
        frames,
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|v| v as i64))
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
