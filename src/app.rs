use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::analytics::TelemetryAnalyzer;
use crate::cache::FlightCache;
use crate::clock::{self, SharedClock};
use crate::config::{Config, ConfigError};
use crate::pipeline::{
    CycleOutcome, IngestionPipeline, ObserverHandle, PipelineError, PipelineSettings,
};
use crate::source::{OpenSkyClient, SourceError, StateSource};
use crate::storage::{Storage, StorageError};
use crate::web::{self, AppState, TickerRotation};

/// How long shutdown waits for an in-flight cycle.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("source: {0}")]
    Source(#[from] SourceError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything one process runs, wired together.
pub struct App {
    pub state: AppState,
}

impl App {
    /// Loads the config file, then opens the configured database and the
    /// live source.
    pub fn from_file(path: &str) -> Result<Self, AppError> {
        let config = Config::from_file(path)?;
        let storage = Arc::new(Storage::open(&config.storage.path)?);
        let source = Arc::new(OpenSkyClient::new(&config.source)?);
        Ok(Self::assemble(config, storage, source, clock::system()))
    }

    pub fn assemble(
        config: Config,
        storage: Arc<Storage>,
        source: Arc<dyn StateSource>,
        clock: SharedClock,
    ) -> Self {
        let cache = Arc::new(FlightCache::new(
            storage.clone(),
            &config.cache,
            clock.clone(),
        ));
        let analyzer = Arc::new(TelemetryAnalyzer::new(
            storage.clone(),
            &config.analytics,
            config.retention.hours,
            clock.clone(),
        ));

        let mut pipeline = IngestionPipeline::new(
            source,
            storage.clone(),
            PipelineSettings::from_config(&config),
            ObserverHandle::new(config.observer()),
            clock.clone(),
        );

        // Analytics first so the refresh below picks up fresh trends.
        let every = config.ingestion.analytics_every_cycles.max(1);
        let completed = AtomicU64::new(0);
        let write_back = analyzer.clone();
        pipeline.on_complete(move |_| {
            let cycle = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if cycle % every == 0 {
                write_back.update_current_state_with_analytics()?;
            }
            Ok(())
        });

        let refresh = cache.clone();
        pipeline.on_complete(move |_| {
            refresh.refresh_from_storage()?;
            Ok(())
        });

        let state = AppState {
            config: Arc::new(config),
            storage,
            cache,
            analyzer,
            pipeline: Arc::new(pipeline),
            ticker: Arc::new(Mutex::new(TickerRotation::default())),
            clock,
        };
        Self { state }
    }

    pub async fn poll_once(&self) -> Result<CycleOutcome, PipelineError> {
        self.state.pipeline.run_cycle().await
    }

    /// Runs the ingestion loop and the HTTP server until `shutdown` resolves,
    /// then stops the loop.
    pub async fn run<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.state.pipeline.clone().start();
        let bind = self.state.config.web.bind.clone();

        let served = web::run_server(self.state, &bind, shutdown).await;

        if !handle.stop(STOP_TIMEOUT).await {
            log::warn!("Abandoning ingestion loop");
        }
        served.map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::Trend;
    use crate::testing::{config, frame, manual_clock, StaticSource};

    fn app(analytics_every_cycles: u64) -> (App, Arc<StaticSource>) {
        let mut config = config();
        config.ingestion.analytics_every_cycles = analytics_every_cycles;
        let source = Arc::new(StaticSource {
            frames: vec![frame("a1", 40.7, -73.8), frame("a2", 41.0, -73.8)],
            ..StaticSource::default()
        });
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let (_clock, shared) = manual_clock();
        (App::assemble(config, storage, source.clone(), shared), source)
    }

    #[tokio::test]
    async fn completed_cycle_refreshes_the_cache() {
        let (app, source) = app(6);
        assert_eq!(app.state.cache.len(), 0);

        let outcome = app.poll_once().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Processed(2));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.state.cache.len(), 2);
        assert_eq!(app.state.cache.get_all()[0].object_id, "a1");
    }

    #[tokio::test]
    async fn analytics_are_written_back_on_cadence() {
        let (app, _source) = app(5);

        for _ in 0..4 {
            app.poll_once().await.unwrap();
        }
        let state = app.state.storage.get_current_state("a1").unwrap().unwrap();
        assert_eq!(state.altitude_trend, None);

        // Fifth cycle: five samples in history and the cadence fires.
        app.poll_once().await.unwrap();
        let state = app.state.storage.get_current_state("a1").unwrap().unwrap();
        assert_eq!(state.altitude_trend, Some(Trend::Unknown));
        let cached = app.state.cache.get("a1").unwrap();
        assert_eq!(cached.altitude_trend, Some(Trend::Unknown));
    }
}
