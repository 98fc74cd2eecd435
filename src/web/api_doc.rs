use utoipa::OpenApi;

use super::api::error::ErrorResponse;
use super::api::flights::{
    FlightDetailResponse, FlightListResponse, FlightSort, HistoryResponse, HistorySeries,
    TickerFlight, TickerResponse,
};
use super::api::metrics::{
    ConfigSummary, DatabaseStatus, FleetResponse, HealthResponse, LocationResponse,
    ObserverStatus, SetLocationRequest, StatusResponse,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::metrics::health,
        super::api::flights::list_flights,
        super::api::flights::get_flight,
        super::api::flights::get_flight_history,
        super::api::flights::get_ticker_flight,
        super::api::metrics::fleet,
        super::api::metrics::status,
        super::api::metrics::get_location,
        super::api::metrics::set_location,
    ),
    components(
        schemas(
            ErrorResponse,
            FlightListResponse,
            FlightDetailResponse,
            FlightSort,
            HistoryResponse,
            HistorySeries,
            TickerFlight,
            TickerResponse,
            HealthResponse,
            FleetResponse,
            StatusResponse,
            DatabaseStatus,
            ObserverStatus,
            ConfigSummary,
            LocationResponse,
            SetLocationRequest,
            crate::cache::CachedFlight,
            crate::cache::CacheStats,
            crate::analytics::AnalyticsResult,
            crate::analytics::FleetStatistics,
            crate::analytics::MetricSummary,
            crate::analytics::RollingStats,
            crate::analytics::Trend,
            crate::enrich::FlightPhase,
            crate::pipeline::PipelineStats,
            crate::source::GeoPoint,
        )
    ),
    info(
        title = "Flightwall API",
        description = "Live aircraft near the observer, with rolling analytics",
        version = "0.1.0"
    ),
    tags(
        (name = "flights", description = "Tracked flights"),
        (name = "metrics", description = "Fleet statistics and system status")
    )
)]
pub struct ApiDoc;
