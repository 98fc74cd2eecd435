use std::sync::{Arc, Mutex};

use super::ticker::TickerRotation;
use crate::analytics::TelemetryAnalyzer;
use crate::cache::FlightCache;
use crate::clock::SharedClock;
use crate::config::Config;
use crate::pipeline::IngestionPipeline;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    pub cache: Arc<FlightCache>,
    pub analyzer: Arc<TelemetryAnalyzer>,
    pub pipeline: Arc<IngestionPipeline>,
    pub ticker: Arc<Mutex<TickerRotation>>,
    pub clock: SharedClock,
}
