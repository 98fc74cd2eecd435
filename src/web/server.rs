use axum::{routing::get, Router};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::api::flights as flight_handlers;
use super::api::metrics as metric_handlers;
use super::api_doc::ApiDoc;
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(metric_handlers::health))
        // Flight endpoints
        .route("/api/flights", get(flight_handlers::list_flights))
        .route("/api/flights/ticker", get(flight_handlers::get_ticker_flight))
        .route("/api/flights/{id}", get(flight_handlers::get_flight))
        .route(
            "/api/flights/{id}/history",
            get(flight_handlers::get_flight_history),
        )
        // Metrics endpoints
        .route("/api/metrics/fleet", get(metric_handlers::fleet))
        .route("/api/metrics/status", get(metric_handlers::status))
        .route(
            "/api/metrics/location",
            get(metric_handlers::get_location).post(metric_handlers::set_location),
        )
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, then drains open connections.
pub async fn run_server<F>(state: AppState, bind_addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::app_state;
    use reqwest::StatusCode;
    use serde_json::Value;

    /// Serves a fresh app on an ephemeral port and returns its base URL.
    async fn spawn_app() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(app_state())).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: String) -> (StatusCode, Value) {
        let response = reqwest::get(url).await.unwrap();
        (response.status(), response.json().await.unwrap())
    }

    #[tokio::test]
    async fn ticker_route_is_not_taken_for_a_flight_id() {
        let base = spawn_app().await;
        let (status, body) = get_json(format!("{base}/api/flights/ticker")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No aircraft in range");
    }

    #[tokio::test]
    async fn unknown_flight_is_a_json_404() {
        let base = spawn_app().await;
        let (status, body) = get_json(format!("{base}/api/flights/abc123")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "flight_not_found");
    }

    #[tokio::test]
    async fn invalid_location_is_a_400() {
        let base = spawn_app().await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/metrics/location"))
            .json(&serde_json::json!({ "latitude": 12.0, "longitude": 200.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let base = spawn_app().await;
        let (status, body) = get_json(format!("{base}/api-doc/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/flights/{id}/history"].is_object());
    }
}
