use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::error::PipelineError;
use super::types::{CycleOutcome, ObserverHandle, PipelineSettings, PipelineStats};
use crate::clock::SharedClock;
use crate::enrich::enrich;
use crate::source::{GeoPoint, StateSource};
use crate::storage::Storage;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Called with the processed count after every successful cycle.
pub type CompletionCallback = Box<dyn Fn(usize) -> Result<(), CallbackError> + Send + Sync>;

/// Fetch, enrich, persist; once per poll interval.
pub struct IngestionPipeline {
    source: Arc<dyn StateSource>,
    storage: Arc<Storage>,
    clock: SharedClock,
    settings: PipelineSettings,
    observer: ObserverHandle,
    stats: StdMutex<PipelineStats>,
    callbacks: Vec<CompletionCallback>,
}

/// Running loop. Dropping it without [`PipelineHandle::stop`] detaches the loop.
#[derive(Debug)]
pub struct PipelineHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl PipelineHandle {
    /// Asks the loop to exit at its next iteration boundary and waits up to
    /// `timeout` for it. Returns false if the loop was still busy.
    pub async fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(());
        match tokio::time::timeout(timeout, self.join).await {
            Ok(_) => true,
            Err(_) => {
                log::warn!(
                    "Ingestion loop did not stop within {:.1}s",
                    timeout.as_secs_f64()
                );
                false
            }
        }
    }
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn StateSource>,
        storage: Arc<Storage>,
        settings: PipelineSettings,
        observer: ObserverHandle,
        clock: SharedClock,
    ) -> Self {
        Self {
            source,
            storage,
            clock,
            settings,
            observer,
            stats: StdMutex::new(PipelineStats::default()),
            callbacks: Vec::new(),
        }
    }

    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(usize) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn observer(&self) -> ObserverHandle {
        self.observer.clone()
    }

    pub fn set_observer_location(&self, location: GeoPoint) {
        self.observer.set(location);
        log::info!(
            "Observer location set to {:.4}, {:.4}",
            location.latitude,
            location.longitude
        );
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, PipelineStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_error(&self) {
        self.lock_stats().error_count += 1;
    }

    /// One full fetch, enrich, persist cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let Some(observer) = self.observer.get() else {
            log::debug!("No observer location configured, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        };

        let batch = match self
            .source
            .fetch_around(observer, self.settings.radius_km)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.record_error();
                log::error!("Ingestion fetch failed: {}", e);
                return Err(e.into());
            }
        };

        let fetch_count = {
            let mut stats = self.lock_stats();
            stats.fetch_count += 1;
            stats.fetch_count
        };

        let now = self.clock.now();
        let frames: Vec<_> = batch
            .frames
            .into_iter()
            .map(|frame| enrich(frame, Some(observer)))
            .collect();
        let run_cleanup = fetch_count % self.settings.cleanup_every_cycles == 0;
        let stale_cutoff = (now - self.settings.stale_threshold).timestamp();
        let retention_cutoff = (now - self.settings.retention).timestamp();

        let written = self.storage.write(|tx| {
            for frame in &frames {
                tx.upsert_current_state(frame, now)?;
            }
            tx.append_history(&frames, batch.server_time, now)?;

            if run_cleanup {
                let states = tx.delete_stale_states(stale_cutoff)?;
                let history = tx.delete_history_before(retention_cutoff)?;
                Ok(Some((states, history)))
            } else {
                Ok(None)
            }
        });

        let cleaned = match written {
            Ok(cleaned) => cleaned,
            Err(e) => {
                self.record_error();
                log::error!("Ingestion write failed, cycle rolled back: {}", e);
                return Err(e.into());
            }
        };
        if let Some((states, history)) = cleaned {
            log::info!(
                "Cleanup: removed {} stale flights, {} history records",
                states,
                history
            );
        }

        let processed = frames.len();
        {
            let mut stats = self.lock_stats();
            stats.last_fetch_time = Some(now);
            stats.last_processed_count = processed;
        }
        log::info!("Processed {} flights", processed);

        self.notify(processed);
        Ok(CycleOutcome::Processed(processed))
    }

    fn notify(&self, processed: usize) {
        for (i, callback) in self.callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(processed))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Completion callback {} failed: {}", i, e),
                Err(_) => log::error!("Completion callback {} panicked", i),
            }
        }
    }

    /// Spawns the polling loop on the current runtime.
    pub fn start(self: Arc<Self>) -> PipelineHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        self.lock_stats().running = true;
        log::info!(
            "Ingestion started (interval {}s, radius {} km)",
            self.settings.poll_interval.as_secs(),
            self.settings.radius_km
        );

        let join = tokio::spawn(async move {
            run_loop(&self, stop_rx).await;
            self.lock_stats().running = false;
            log::info!("Ingestion stopped");
        });

        PipelineHandle { stop_tx, join }
    }
}

async fn run_loop(pipeline: &IngestionPipeline, mut stop_rx: oneshot::Receiver<()>) {
    loop {
        // Failures are already counted and logged; the next cycle retries.
        let _ = pipeline.run_cycle().await;

        let should_stop = tokio::select! {
            _ = sleep(pipeline.settings.poll_interval) => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            return;
        }
    }
}
