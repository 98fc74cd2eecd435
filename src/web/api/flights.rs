use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analytics::AnalyticsResult;
use crate::cache::CachedFlight;
use crate::enrich::FlightPhase;
use crate::source::GeoPoint;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;
const DEFAULT_HISTORY_MINUTES: i64 = 30;
const MAX_HISTORY_MINUTES: i64 = 1440;
const DEFAULT_HISTORY_LIMIT: usize = 500;
const MAX_HISTORY_LIMIT: usize = 5000;
const DEFAULT_ROTATION_SECS: i64 = 8;
const MAX_ROTATION_SECS: i64 = 3600;
const DEFAULT_TICKER_DISTANCE_KM: f64 = 150.0;

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlightSort {
    #[default]
    Distance,
    Altitude,
    Speed,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFlightsQuery {
    pub airborne_only: Option<bool>,
    pub limit: Option<usize>,
    pub sort: Option<FlightSort>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlightListResponse {
    pub flights: Vec<CachedFlight>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/flights",
    tag = "flights",
    params(
        ("airborne_only" = Option<bool>, Query, description = "Only airborne flights (default true)"),
        ("limit" = Option<usize>, Query, description = "Maximum results (default 100, max 500)"),
        ("sort" = Option<FlightSort>, Query, description = "distance | altitude | speed")
    ),
    responses(
        (status = 200, description = "Tracked flights", body = FlightListResponse)
    )
)]
pub async fn list_flights(
    State(state): State<AppState>,
    Query(query): Query<ListFlightsQuery>,
) -> Json<FlightListResponse> {
    let mut flights = if query.airborne_only.unwrap_or(true) {
        state.cache.get_airborne()
    } else {
        state.cache.get_all()
    };

    match query.sort.unwrap_or_default() {
        // Cache order is already nearest first.
        FlightSort::Distance => {}
        FlightSort::Altitude => {
            flights.sort_by_key(|f| std::cmp::Reverse(f.altitude_ft.unwrap_or(0)))
        }
        FlightSort::Speed => flights.sort_by_key(|f| std::cmp::Reverse(f.speed_kts.unwrap_or(0))),
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    flights.truncate(limit);

    Json(FlightListResponse {
        count: flights.len(),
        flights,
        timestamp: state.clock.now(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct FlightDetailQuery {
    pub include_analytics: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlightDetailResponse {
    pub flight: CachedFlight,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsResult>,
}

#[utoipa::path(
    get,
    path = "/api/flights/{id}",
    tag = "flights",
    params(
        ("id" = String, Path, description = "Transponder address (hex)"),
        ("include_analytics" = Option<bool>, Query, description = "Attach rolling analytics")
    ),
    responses(
        (status = 200, description = "Flight detail", body = FlightDetailResponse),
        (status = 404, description = "Unknown flight", body = ErrorResponse)
    )
)]
pub async fn get_flight(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FlightDetailQuery>,
) -> ApiResult<Json<FlightDetailResponse>> {
    let id = id.to_lowercase();

    let flight = match state.cache.get(&id) {
        Some(flight) => flight,
        None => {
            let current = state
                .storage
                .get_current_state(&id)?
                .ok_or(ApiError::NotFound("flight_not_found"))?;
            state.cache.update(&current);
            CachedFlight::from_state(&current, state.clock.now())
        }
    };

    let analytics = if query.include_analytics.unwrap_or(false) {
        state.analyzer.analyze(&id)?
    } else {
        None
    };

    Ok(Json(FlightDetailResponse { flight, analytics }))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub minutes: Option<i64>,
    pub limit: Option<usize>,
}

/// Parallel arrays, one slot per history row, for charting.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct HistorySeries {
    pub timestamps: Vec<i64>,
    pub altitudes_ft: Vec<Option<i64>>,
    pub speeds_kts: Vec<Option<i64>>,
    pub vertical_rates_fpm: Vec<Option<i64>>,
    pub positions: Vec<Option<GeoPoint>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub object_id: String,
    pub history: HistorySeries,
    pub count: usize,
    pub minutes: i64,
}

#[utoipa::path(
    get,
    path = "/api/flights/{id}/history",
    tag = "flights",
    params(
        ("id" = String, Path, description = "Transponder address (hex)"),
        ("minutes" = Option<i64>, Query, description = "History span (default 30, max 1440)"),
        ("limit" = Option<usize>, Query, description = "Most recent rows to return (default 500, max 5000)")
    ),
    responses(
        (status = 200, description = "Position history", body = HistoryResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse)
    )
)]
pub async fn get_flight_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let id = id.to_lowercase();
    let minutes = query
        .minutes
        .unwrap_or(DEFAULT_HISTORY_MINUTES)
        .min(MAX_HISTORY_MINUTES);
    if minutes <= 0 {
        return Err(ApiError::Validation("minutes must be positive".into()));
    }
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);

    let from_ts = (state.clock.now() - Duration::minutes(minutes)).timestamp();
    let records = state.storage.query_history_range(&id, from_ts, Some(limit))?;

    let mut history = HistorySeries::default();
    for record in &records {
        history.timestamps.push(record.timestamp);
        history.altitudes_ft.push(record.altitude_ft());
        history.speeds_kts.push(record.speed_kts());
        history.vertical_rates_fpm.push(record.vertical_rate_fpm());
        history.positions.push(match (record.latitude, record.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        });
    }

    Ok(Json(HistoryResponse {
        object_id: id,
        count: records.len(),
        history,
        minutes,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TickerQuery {
    pub rotation_interval: Option<i64>,
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TickerFlight {
    pub object_id: String,
    pub callsign: String,
    pub altitude_ft: Option<i64>,
    pub flight_level: Option<String>,
    pub speed_kts: Option<i64>,
    pub heading: Option<i64>,
    pub vertical_rate_fpm: Option<i64>,
    pub flight_phase: FlightPhase,
    pub distance_km: Option<f64>,
    pub is_anomaly: bool,
}

impl From<&CachedFlight> for TickerFlight {
    fn from(flight: &CachedFlight) -> Self {
        Self {
            object_id: flight.object_id.clone(),
            callsign: flight.callsign.clone(),
            altitude_ft: flight.altitude_ft,
            flight_level: flight.flight_level.clone(),
            speed_kts: flight.speed_kts,
            heading: flight.heading,
            vertical_rate_fpm: flight.vertical_rate_fpm,
            flight_phase: flight.flight_phase,
            distance_km: flight.distance_km.map(|d| (d * 10.0).round() / 10.0),
            is_anomaly: flight.is_anomaly,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TickerResponse {
    pub flight: Option<TickerFlight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub current_index: Option<usize>,
    pub total_count: usize,
    pub next_rotation_in: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/flights/ticker",
    tag = "flights",
    params(
        ("rotation_interval" = Option<i64>, Query, description = "Seconds per flight (default 8, max 3600)"),
        ("max_distance" = Option<f64>, Query, description = "Range limit in km (default 150)")
    ),
    responses(
        (status = 200, description = "Flight to show next", body = TickerResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse)
    )
)]
pub async fn get_ticker_flight(
    State(state): State<AppState>,
    Query(query): Query<TickerQuery>,
) -> ApiResult<Json<TickerResponse>> {
    let interval = query.rotation_interval.unwrap_or(DEFAULT_ROTATION_SECS);
    if !(1..=MAX_ROTATION_SECS).contains(&interval) {
        return Err(ApiError::Validation(
            "rotation_interval must be between 1 and 3600".into(),
        ));
    }
    let max_distance = query.max_distance.unwrap_or(DEFAULT_TICKER_DISTANCE_KM);

    let flights: Vec<CachedFlight> = state
        .cache
        .get_airborne()
        .into_iter()
        .filter(|f| f.distance_km.is_some_and(|d| d <= max_distance))
        .collect();

    let pick = state
        .ticker
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pick(flights.len(), Duration::seconds(interval), state.clock.now());

    let response = match pick {
        Some(pick) => TickerResponse {
            flight: Some(TickerFlight::from(&flights[pick.index])),
            message: None,
            current_index: Some(pick.index),
            total_count: flights.len(),
            next_rotation_in: Some(pick.next_rotation_in),
        },
        None => TickerResponse {
            flight: None,
            message: Some("No aircraft in range".into()),
            current_index: None,
            total_count: 0,
            next_rotation_in: None,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::enrich;
    use crate::testing::{frame, t0};
    use crate::testing::app_state;

    fn seed(state: &AppState) {
        let observer = Some(GeoPoint::new(40.64, -73.78));
        let mut low = frame("a1", 40.7, -73.8);
        low.baro_altitude = Some(3_000.0);
        let mut high = frame("a2", 41.5, -73.8);
        high.baro_altitude = Some(11_000.0);
        let mut parked = frame("g1", 40.64, -73.78);
        parked.on_ground = true;
        parked.baro_altitude = None;
        let far = frame("f1", 45.0, -73.8);

        let enriched: Vec<_> = [low, high, parked, far]
            .into_iter()
            .map(|f| enrich(f, observer))
            .collect();
        state
            .storage
            .write(|tx| {
                for e in &enriched {
                    tx.upsert_current_state(e, t0())?;
                }
                tx.append_history(&enriched, t0().timestamp(), t0())
            })
            .unwrap();
        state.cache.refresh_from_storage().unwrap();
    }

    #[tokio::test]
    async fn list_defaults_to_airborne_by_distance() {
        let state = app_state();
        seed(&state);

        let Json(body) = list_flights(State(state.clone()), Query(ListFlightsQuery::default())).await;
        let ids: Vec<&str> = body.flights.iter().map(|f| f.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "f1"]);
        assert_eq!(body.count, 3);

        let query = ListFlightsQuery {
            airborne_only: Some(false),
            limit: Some(2),
            sort: Some(FlightSort::Altitude),
        };
        let Json(body) = list_flights(State(state), Query(query)).await;
        let ids: Vec<&str> = body.flights.iter().map(|f| f.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "f1"]);
    }

    #[tokio::test]
    async fn detail_falls_back_to_storage() {
        let state = app_state();
        seed(&state);
        state.cache.clear();

        let query = FlightDetailQuery {
            include_analytics: Some(true),
        };
        let Json(body) = get_flight(State(state.clone()), Path("A2".into()), Query(query))
            .await
            .ok()
            .unwrap();
        assert_eq!(body.flight.object_id, "a2");
        // One history row is not enough to analyze.
        assert!(body.analytics.is_none());
        // The storage read warms the cache for the next lookup.
        assert_eq!(state.cache.get("a2").map(|f| f.object_id), Some("a2".into()));
        assert_eq!(state.cache.len(), 1);

        let missing = get_flight(
            State(state),
            Path("zzzzzz".into()),
            Query(FlightDetailQuery::default()),
        )
        .await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_arrays_stay_aligned() {
        let state = app_state();
        seed(&state);
        let mut blind = frame("a1", 0.0, 0.0);
        blind.position = None;
        let blind = enrich(blind, None);
        state
            .storage
            .write(|tx| tx.append_history(std::slice::from_ref(&blind), t0().timestamp(), t0()))
            .unwrap();

        let Json(body) = get_flight_history(
            State(state),
            Path("a1".into()),
            Query(HistoryQuery::default()),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(body.count, 2);
        assert_eq!(body.minutes, 30);
        assert_eq!(body.history.timestamps.len(), 2);
        assert_eq!(body.history.positions.len(), 2);
        assert_eq!(body.history.altitudes_ft[0], Some(9_842));
        assert!(body.history.positions[1].is_none());
    }

    #[tokio::test]
    async fn ticker_rotates_through_flights_in_range() {
        let state = app_state();
        seed(&state);

        let Json(body) = get_ticker_flight(State(state.clone()), Query(TickerQuery::default()))
            .await
            .ok()
            .unwrap();
        // f1 is ~485 km out, g1 is on the ground.
        assert_eq!(body.total_count, 2);
        assert_eq!(body.flight.unwrap().object_id, "a1");

        let query = TickerQuery {
            max_distance: Some(1.0),
            ..TickerQuery::default()
        };
        let Json(body) = get_ticker_flight(State(state), Query(query)).await.ok().unwrap();
        assert!(body.flight.is_none());
        assert_eq!(body.message.as_deref(), Some("No aircraft in range"));
    }

    #[tokio::test]
    async fn ticker_rejects_out_of_range_intervals() {
        let state = app_state();
        for interval in [0, -5, i64::MAX] {
            let query = TickerQuery {
                rotation_interval: Some(interval),
                ..TickerQuery::default()
            };
            assert!(matches!(
                get_ticker_flight(State(state.clone()), Query(query)).await,
                Err(ApiError::Validation(_))
            ));
        }
    }
}
