use chrono::Duration;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::stats::{linear_trend, rolling_stats, summarize, z_score};
use super::types::{AnalyticsResult, FleetStatistics, RollingStats};
use crate::clock::SharedClock;
use crate::config::AnalyticsConfig;
use crate::storage::{AnalyticsUpdate, HistoryRecord, StateFilter, Storage, StorageError};
use crate::ttl_cache::TtlCache;

/// Rolling statistics, trend and anomaly scoring over position history.
pub struct TelemetryAnalyzer {
    storage: Arc<Storage>,
    settings: AnalyticsConfig,
    retention: Duration,
    results: TtlCache<AnalyticsResult>,
    clock: SharedClock,
}

impl TelemetryAnalyzer {
    pub fn new(
        storage: Arc<Storage>,
        settings: &AnalyticsConfig,
        retention_hours: u64,
        clock: SharedClock,
    ) -> Self {
        let results = TtlCache::new(
            Duration::seconds(settings.result_ttl_secs as i64),
            clock.clone(),
        );
        Self {
            storage,
            settings: settings.clone(),
            retention: Duration::hours(retention_hours as i64),
            results,
            clock,
        }
    }

    /// Analytics for one aircraft, or `None` when there is too little history.
    pub fn analyze(&self, object_id: &str) -> Result<Option<AnalyticsResult>, StorageError> {
        let object_id = object_id.to_lowercase();
        if let Some(cached) = self.results.get(&object_id) {
            return Ok(Some(cached));
        }

        let now = self.clock.now();
        let from_ts = (now - self.retention).timestamp();
        let history = self.storage.query_history_range(&object_id, from_ts, None)?;
        if history.len() < self.settings.min_samples {
            log::debug!(
                "Insufficient history for {}: {} samples",
                object_id,
                history.len()
            );
            return Ok(None);
        }

        let window_start = now.timestamp() - self.settings.window_secs as i64;
        let window: Vec<&HistoryRecord> =
            history.iter().filter(|r| r.timestamp >= window_start).collect();

        let min = self.settings.min_samples;
        let altitudes = metric(&window, |r| r.baro_altitude);
        let speeds = metric(&window, |r| r.velocity);
        let vertical_rates = metric(&window, |r| r.vertical_rate);
        let headings = metric(&window, |r| r.true_track);

        let mut result = AnalyticsResult {
            object_id: object_id.clone(),
            callsign: history.last().and_then(|r| r.callsign.clone()),
            computed_at: now,
            total_samples: history.len(),
            window_samples: window.len(),
            altitude: rolling_stats(&values(&altitudes), min),
            speed: rolling_stats(&values(&speeds), min),
            vertical_rate: rolling_stats(&values(&vertical_rates), min),
            heading: rolling_stats(&values(&headings), min),
            altitude_trend: linear_trend(&altitudes, self.settings.trend_threshold, min),
            speed_trend: linear_trend(&speeds, self.settings.trend_threshold, min),
            is_altitude_anomaly: false,
            is_speed_anomaly: false,
            is_vertical_rate_anomaly: false,
            anomaly_reasons: Vec::new(),
        };

        if let Some(latest) = history.last() {
            self.detect_anomalies(&mut result, latest);
        }

        self.results.insert(object_id, result.clone());
        Ok(Some(result))
    }

    fn detect_anomalies(&self, result: &mut AnalyticsResult, latest: &HistoryRecord) {
        let threshold = self.settings.anomaly_z_threshold;

        if let Some(z) = exceeds(latest.baro_altitude, result.altitude.as_ref(), threshold) {
            result.is_altitude_anomaly = true;
            result.anomaly_reasons.push(format!(
                "Altitude deviation: {:.0}m (z={:.1})",
                latest.baro_altitude.unwrap_or_default(),
                z
            ));
        }

        if let Some(z) = exceeds(latest.velocity, result.speed.as_ref(), threshold) {
            result.is_speed_anomaly = true;
            result.anomaly_reasons.push(format!(
                "Speed deviation: {:.0}m/s (z={:.1})",
                latest.velocity.unwrap_or_default(),
                z
            ));
        }

        // Fast climbs and descents are routine; only a spike that is also
        // out of character for this aircraft counts.
        let spike = latest
            .vertical_rate
            .filter(|vr| vr.abs() > self.settings.vertical_rate_limit_mps);
        if let Some(z) = exceeds(spike, result.vertical_rate.as_ref(), threshold) {
            result.is_vertical_rate_anomaly = true;
            result.anomaly_reasons.push(format!(
                "Vertical rate spike: {:.1}m/s (z={:.1})",
                spike.unwrap_or_default(),
                z
            ));
        }
    }

    /// Analyzes every airborne aircraft that has enough history.
    pub fn analyze_all_active(&self) -> Result<HashMap<String, AnalyticsResult>, StorageError> {
        let mut results = HashMap::new();
        for object_id in self.storage.airborne_ids()? {
            if let Some(result) = self.analyze(&object_id)? {
                results.insert(object_id, result);
            }
        }
        log::info!("Analyzed {} active flights", results.len());
        Ok(results)
    }

    /// Writes trends and the combined anomaly flag back to current state in
    /// one transaction. Returns the number of rows updated.
    pub fn update_current_state_with_analytics(&self) -> Result<usize, StorageError> {
        let analyzed = self.analyze_all_active()?;
        if analyzed.is_empty() {
            return Ok(0);
        }

        let updates: Vec<AnalyticsUpdate> = analyzed
            .into_values()
            .map(|result| AnalyticsUpdate {
                is_anomaly: result.has_anomaly(),
                object_id: result.object_id,
                altitude_trend: result.altitude_trend,
                speed_trend: result.speed_trend,
            })
            .collect();

        let updated = self.storage.write(|tx| {
            let mut updated = 0;
            for update in &updates {
                if tx.update_analytics(update)? {
                    updated += 1;
                }
            }
            Ok(updated)
        })?;

        log::info!("Updated {} flight states with analytics", updated);
        Ok(updated)
    }

    /// Point-in-time summary of the airborne fleet.
    pub fn fleet_statistics(&self) -> Result<FleetStatistics, StorageError> {
        let flights = self.storage.query_current_states(StateFilter::Airborne)?;

        let altitudes: Vec<f64> = flights.iter().filter_map(|f| f.baro_altitude).collect();
        let speeds: Vec<f64> = flights.iter().filter_map(|f| f.velocity).collect();

        let mut by_phase = BTreeMap::new();
        for flight in &flights {
            *by_phase.entry(flight.flight_phase.to_string()).or_insert(0) += 1;
        }

        Ok(FleetStatistics {
            count: flights.len(),
            altitude: summarize(&altitudes),
            speed: summarize(&speeds),
            by_phase,
            anomaly_count: flights.iter().filter(|f| f.is_anomaly).count(),
        })
    }
}

/// `(timestamp, value)` pairs with missing values as NaN.
fn metric(window: &[&HistoryRecord], pick: impl Fn(&HistoryRecord) -> Option<f64>) -> Vec<(f64, f64)> {
    window
        .iter()
        .map(|r| (r.timestamp as f64, pick(r).unwrap_or(f64::NAN)))
        .collect()
}

fn values(samples: &[(f64, f64)]) -> Vec<f64> {
    samples.iter().map(|(_, v)| *v).collect()
}

fn exceeds(latest: Option<f64>, stats: Option<&RollingStats>, threshold: f64) -> Option<f64> {
    let z = z_score(latest?, stats?)?;
    (z > threshold).then_some(z)
}
