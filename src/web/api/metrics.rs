use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analytics::FleetStatistics;
use crate::cache::CacheStats;
use crate::pipeline::PipelineStats;
use crate::source::GeoPoint;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process is up", body = HealthResponse)
    ),
    tag = "metrics"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: state.clock.now(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FleetResponse {
    pub fleet: FleetStatistics,
    pub cache: CacheStats,
    pub timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/metrics/fleet",
    responses(
        (status = 200, description = "Fleet-wide statistics", body = FleetResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    ),
    tag = "metrics"
)]
pub async fn fleet(State(state): State<AppState>) -> ApiResult<Json<FleetResponse>> {
    Ok(Json(FleetResponse {
        fleet: state.analyzer.fleet_statistics()?,
        cache: state.cache.stats(),
        timestamp: state.clock.now(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub kind: String,
    pub history_records: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ObserverStatus {
    pub location: Option<GeoPoint>,
    pub radius_km: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigSummary {
    pub poll_interval_secs: u64,
    pub retention_hours: u64,
    pub source_authenticated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: DatabaseStatus,
    pub ingestion: PipelineStats,
    pub cache: CacheStats,
    pub observer: ObserverStatus,
    pub config: ConfigSummary,
}

#[utoipa::path(
    get,
    path = "/api/metrics/status",
    responses(
        (status = 200, description = "System status", body = StatusResponse)
    ),
    tag = "metrics"
)]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let connected = match state.storage.ping() {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Storage health check failed: {}", e);
            false
        }
    };
    let history_records = if connected {
        state
            .storage
            .count_history()
            .map_err(|e| log::warn!("Could not count history records: {}", e))
            .ok()
    } else {
        None
    };
    let ingestion = state.pipeline.stats();
    let healthy = connected && ingestion.running;

    Json(StatusResponse {
        status: if healthy { "healthy" } else { "degraded" }.into(),
        timestamp: state.clock.now(),
        database: DatabaseStatus {
            connected,
            kind: "sqlite".into(),
            history_records,
        },
        ingestion,
        cache: state.cache.stats(),
        observer: ObserverStatus {
            location: state.pipeline.observer().get(),
            radius_km: state.config.ingestion.radius_km,
        },
        config: ConfigSummary {
            poll_interval_secs: state.config.ingestion.poll_interval_secs,
            retention_hours: state.config.retention.hours,
            source_authenticated: state.config.is_authenticated(),
        },
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationResponse {
    pub location: Option<GeoPoint>,
    pub radius_km: f64,
    /// `configured` once a location is set, `none` otherwise.
    pub source: String,
}

fn location_response(state: &AppState) -> LocationResponse {
    let location = state.pipeline.observer().get();
    LocationResponse {
        source: if location.is_some() { "configured" } else { "none" }.into(),
        location,
        radius_km: state.config.ingestion.radius_km,
    }
}

#[utoipa::path(
    get,
    path = "/api/metrics/location",
    responses(
        (status = 200, description = "Current observer location", body = LocationResponse)
    ),
    tag = "metrics"
)]
pub async fn get_location(State(state): State<AppState>) -> Json<LocationResponse> {
    Json(location_response(&state))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetLocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[utoipa::path(
    post,
    path = "/api/metrics/location",
    request_body = SetLocationRequest,
    responses(
        (status = 200, description = "Observer location updated", body = LocationResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "metrics"
)]
pub async fn set_location(
    State(state): State<AppState>,
    Json(request): Json<SetLocationRequest>,
) -> ApiResult<Json<LocationResponse>> {
    let (Some(latitude), Some(longitude)) = (request.latitude, request.longitude) else {
        return Err(ApiError::Validation(
            "latitude and longitude are required".into(),
        ));
    };
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ApiError::Validation(
            "latitude must be between -90 and 90".into(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::Validation(
            "longitude must be between -180 and 180".into(),
        ));
    }

    state
        .pipeline
        .set_observer_location(GeoPoint::new(latitude, longitude));
    // Cached distances were measured from the old location.
    state.cache.clear();
    Ok(Json(location_response(&state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::enrich;
    use crate::testing::{app_state, frame, t0};

    #[tokio::test]
    async fn status_is_degraded_while_loop_is_stopped() {
        let state = app_state();
        let Json(body) = status(State(state)).await;

        assert_eq!(body.status, "degraded");
        assert!(body.database.connected);
        assert_eq!(body.database.kind, "sqlite");
        assert_eq!(body.database.history_records, Some(0));
        assert!(!body.ingestion.running);
        assert_eq!(body.config.poll_interval_secs, 10);
        assert!(!body.config.source_authenticated);
    }

    #[tokio::test]
    async fn location_updates_are_validated() {
        let state = app_state();
        let Json(before) = get_location(State(state.clone())).await;
        assert_eq!(before.source, "configured");

        let bad = SetLocationRequest {
            latitude: Some(91.0),
            longitude: Some(0.0),
        };
        assert!(matches!(
            set_location(State(state.clone()), Json(bad)).await,
            Err(ApiError::Validation(_))
        ));

        let missing = SetLocationRequest {
            latitude: Some(10.0),
            longitude: None,
        };
        assert!(set_location(State(state.clone()), Json(missing)).await.is_err());

        let nearby = enrich(frame("a1", 40.7, -73.8), state.pipeline.observer().get());
        state
            .storage
            .write(|tx| tx.upsert_current_state(&nearby, t0()))
            .unwrap();
        state.cache.refresh_from_storage().unwrap();
        assert_eq!(state.cache.len(), 1);

        let good = SetLocationRequest {
            latitude: Some(51.47),
            longitude: Some(-0.45),
        };
        let Json(after) = set_location(State(state.clone()), Json(good)).await.ok().unwrap();
        assert_eq!(after.location, Some(GeoPoint::new(51.47, -0.45)));
        assert_eq!(state.pipeline.observer().get(), after.location);
        // Distances to the old observer are no longer served.
        assert_eq!(state.cache.len(), 0);
    }

    #[tokio::test]
    async fn fleet_reports_cache_stats_alongside() {
        let state = app_state();
        let Json(body) = fleet(State(state)).await.ok().unwrap();
        assert_eq!(body.fleet.count, 0);
        assert_eq!(body.cache.max_entries, 500);
    }
}
