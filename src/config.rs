use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::source::GeoPoint;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    pub ingestion: IngestionConfig,
    pub retention: RetentionConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

/// Ten years. Longer spans overflow timestamp arithmetic.
const MAX_RETENTION_HOURS: u64 = 87_600;
/// One day, the ceiling for intervals, TTLs and analysis windows.
const MAX_SPAN_SECS: u64 = 86_400;

fn default_base_url() -> String {
    "https://opensky-network.org/api".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObserverConfig {
    /// `"lat,lon"`; ingestion idles until one is set.
    pub coordinates: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    pub poll_interval_secs: u64,
    pub radius_km: f64,
    pub stale_threshold_secs: u64,
    pub cleanup_every_cycles: u64,
    pub analytics_every_cycles: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    pub window_secs: u64,
    pub min_samples: usize,
    pub anomaly_z_threshold: f64,
    pub trend_threshold: f64,
    pub vertical_rate_limit_mps: f64,
    pub result_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.source.timeout_secs == 0 {
            return invalid("source.timeout_secs must be positive");
        }
        if self.ingestion.poll_interval_secs == 0 {
            return invalid("ingestion.poll_interval_secs must be positive");
        }
        if !(self.ingestion.radius_km > 0.0) {
            return invalid("ingestion.radius_km must be positive");
        }
        if self.ingestion.cleanup_every_cycles == 0 || self.ingestion.analytics_every_cycles == 0 {
            return invalid("ingestion cycle cadences must be positive");
        }
        if self.retention.hours == 0 {
            return invalid("retention.hours must be positive");
        }
        if self.cache.ttl_secs == 0 || self.cache.max_entries == 0 {
            return invalid("cache.ttl_secs and cache.max_entries must be positive");
        }
        if self.analytics.window_secs == 0 || self.analytics.min_samples == 0 {
            return invalid("analytics.window_secs and analytics.min_samples must be positive");
        }
        if !(self.analytics.anomaly_z_threshold > 0.0) || !(self.analytics.trend_threshold >= 0.0) {
            return invalid("analytics thresholds must be positive");
        }
        if self.retention.hours > MAX_RETENTION_HOURS {
            return invalid("retention.hours must be at most 87600");
        }
        let spans = [
            ("source.timeout_secs", self.source.timeout_secs),
            ("ingestion.poll_interval_secs", self.ingestion.poll_interval_secs),
            ("ingestion.stale_threshold_secs", self.ingestion.stale_threshold_secs),
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("analytics.window_secs", self.analytics.window_secs),
            ("analytics.result_ttl_secs", self.analytics.result_ttl_secs),
        ];
        if let Some((name, _)) = spans.iter().find(|(_, secs)| *secs > MAX_SPAN_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{} must be at most {}",
                name, MAX_SPAN_SECS
            )));
        }
        if let Some(coordinates) = &self.observer.coordinates {
            match GeoPoint::from_coordinates(coordinates) {
                Some(point) if point.is_valid() => {}
                _ => return invalid("observer.coordinates must be \"lat,lon\" within range"),
            }
        }
        Ok(())
    }

    pub fn observer(&self) -> Option<GeoPoint> {
        self.observer
            .coordinates
            .as_deref()
            .and_then(GeoPoint::from_coordinates)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.poll_interval_secs)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            (&self.source.username, &self.source.password),
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty()
        )
    }
}
