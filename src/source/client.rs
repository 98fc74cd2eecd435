use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::error::SourceError;
use super::parsing::parse_states_response;
use super::types::{BoundingBox, GeoPoint, SourceQuery, StateBatch};
use crate::config::SourceConfig;

const AUTHENTICATED_INTERVAL: Duration = Duration::from_secs(5);
const ANONYMOUS_INTERVAL: Duration = Duration::from_secs(10);

/// Anything that can hand back a snapshot of positional frames.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<StateBatch, SourceError>;

    async fn fetch_around(
        &self,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<StateBatch, SourceError> {
        let bbox = BoundingBox::from_center_radius(center, radius_km);
        self.fetch(&SourceQuery::Area(bbox)).await
    }

    /// Latest frames for specific transponder addresses.
    async fn fetch_ids(&self, ids: &[String]) -> Result<StateBatch, SourceError> {
        let ids = ids.iter().map(|id| id.trim().to_lowercase()).collect();
        self.fetch(&SourceQuery::Ids(ids)).await
    }
}

/// Depth-1 leaky bucket: a request may only go out once `min_interval` has
/// passed since the previous one.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// Sleeps until the floor since the previous request has passed.
    pub async fn wait(&self) {
        let Some(last) = self.last_request else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            let remaining = self.min_interval - elapsed;
            log::debug!("Rate limiting: sleeping {:.1}s", remaining.as_secs_f64());
            sleep(remaining).await;
        }
    }

    pub fn mark(&mut self) {
        self.last_request = Some(Instant::now());
    }
}

/// Client for the OpenSky `/states/all` endpoint.
pub struct OpenSkyClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    limiter: Mutex<RateLimiter>,
}

impl OpenSkyClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        };

        let min_interval = if credentials.is_some() {
            log::info!("OpenSky client initialized with authentication");
            AUTHENTICATED_INTERVAL
        } else {
            log::warn!("OpenSky client running without authentication (lower rate limits)");
            ANONYMOUS_INTERVAL
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            limiter: Mutex::new(RateLimiter::new(min_interval)),
        })
    }

    async fn send(&self, query: &SourceQuery) -> Result<String, SourceError> {
        let url = format!("{}/states/all", self.base_url);
        let mut request = self.http.get(&url);

        request = match query {
            SourceQuery::Area(bbox) => request.query(&bbox.query_params()),
            SourceQuery::Ids(ids) => request.query(&[("icao24", ids.join(","))]),
        };
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        log::debug!("Fetching states: {} {:?}", url, query);

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("OpenSky rate limit exceeded");
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            log::error!("OpenSky API error: {}", status.as_u16());
            return Err(SourceError::Status(status.as_u16()));
        }

        response.text().await.map_err(map_transport_error)
    }
}

#[async_trait]
impl StateSource for OpenSkyClient {
    async fn fetch(&self, query: &SourceQuery) -> Result<StateBatch, SourceError> {
        // Held across the request so concurrent callers queue behind the floor.
        let mut limiter = self.limiter.lock().await;
        limiter.wait().await;
        let result = self.send(query).await;
        limiter.mark();
        drop(limiter);

        let body = result?;
        let batch = parse_states_response(&body, chrono::Utc::now().timestamp())?;
        log::info!("Received {} positioned state vectors from OpenSky", batch.frames.len());
        Ok(batch)
    }
}

fn map_transport_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        log::error!("OpenSky API timeout");
        SourceError::Timeout
    } else {
        log::error!("OpenSky request failed: {}", err);
        SourceError::Transport(err)
    }
}
