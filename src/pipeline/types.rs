use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use utoipa::ToSchema;

use crate::config::Config;
use crate::source::GeoPoint;

/// Knobs for one pipeline instance, lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll_interval: std::time::Duration,
    pub radius_km: f64,
    pub stale_threshold: Duration,
    pub retention: Duration,
    pub cleanup_every_cycles: u64,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            radius_km: config.ingestion.radius_km,
            stale_threshold: Duration::seconds(config.ingestion.stale_threshold_secs as i64),
            retention: Duration::hours(config.retention.hours as i64),
            cleanup_every_cycles: config.ingestion.cleanup_every_cycles.max(1),
        }
    }
}

/// Observer location shared between the loop and whoever moves it.
#[derive(Debug, Clone, Default)]
pub struct ObserverHandle(Arc<RwLock<Option<GeoPoint>>>);

impl ObserverHandle {
    pub fn new(location: Option<GeoPoint>) -> Self {
        Self(Arc::new(RwLock::new(location)))
    }

    pub fn get(&self) -> Option<GeoPoint> {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, location: GeoPoint) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(location);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PipelineStats {
    pub running: bool,
    /// Successful fetches since start.
    pub fetch_count: u64,
    pub error_count: u64,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_processed_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No observer location yet.
    Skipped,
    Processed(usize),
}
