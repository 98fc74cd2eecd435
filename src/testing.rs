//! Fixtures shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::app::App;
use crate::clock::{ManualClock, SharedClock};
use crate::config::Config;
use crate::source::{
    GeoPoint, PositionSource, SourceError, SourceQuery, StateBatch, StateFrame, StateSource,
};
use crate::storage::Storage;
use crate::web::state::AppState;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub(crate) fn manual_clock() -> (ManualClock, SharedClock) {
    let clock = ManualClock::new(t0());
    let shared: SharedClock = Arc::new(clock.clone());
    (clock, shared)
}

pub(crate) fn config() -> Config {
    Config::from_str(crate::config::tests::SAMPLE).unwrap()
}

/// An airborne, level frame observed at `t0`.
pub(crate) fn frame(id: &str, lat: f64, lon: f64) -> StateFrame {
    StateFrame {
        object_id: id.to_string(),
        callsign: Some(format!("{}X", id.to_uppercase())),
        origin_country: Some("United States".into()),
        time_position: Some(t0().timestamp()),
        last_contact: Some(t0().timestamp()),
        position: Some(GeoPoint::new(lat, lon)),
        baro_altitude: Some(9_000.0),
        on_ground: false,
        velocity: Some(220.0),
        true_track: Some(90.0),
        vertical_rate: Some(0.0),
        geo_altitude: Some(9_100.0),
        squawk: None,
        spi: false,
        position_source: Some(PositionSource::AdsB),
    }
}

/// Hands back the same frames on every fetch, stamped at `t0`.
#[derive(Default)]
pub(crate) struct StaticSource {
    pub frames: Vec<StateFrame>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl StateSource for StaticSource {
    async fn fetch(&self, _query: &SourceQuery) -> Result<StateBatch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StateBatch {
            server_time: t0().timestamp(),
            frames: self.frames.clone(),
        })
    }
}

/// Fully wired app over in-memory storage, a frozen clock and a source
/// that returns nothing.
pub(crate) fn app_state() -> AppState {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let (_clock, shared) = manual_clock();
    App::assemble(config(), storage, Arc::new(StaticSource::default()), shared).state
}
