use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::error::StorageError;
use super::types::{AnalyticsUpdate, CurrentState, HistoryRecord, StateFilter};
use crate::analytics::Trend;
use crate::enrich::{EnrichedFrame, FlightPhase};
use crate::source::PositionSource;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const CURRENT_STATE_COLUMNS: &str = "object_id, callsign, origin_country, latitude, longitude, \
     baro_altitude, geo_altitude, velocity, true_track, vertical_rate, on_ground, squawk, spi, \
     position_source, time_position, last_contact, flight_phase, distance_km, speed_trend, \
     altitude_trend, is_anomaly, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, object_id, callsign, timestamp, latitude, longitude, \
     baro_altitude, geo_altitude, velocity, true_track, vertical_rate, on_ground, \
     position_source, distance_km, created_at";

/// SQLite-backed store for current aircraft state and position history.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        log::info!("Opened telemetry database at {}", path.display());
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Raw SQL against the live connection, for setting up failure cases.
    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        Ok(self.lock().execute_batch(sql)?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent; keep serving.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` inside one transaction. Commits when `f` returns `Ok`,
    /// rolls back otherwise.
    pub fn write<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, StorageError>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = f(&StoreTx { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// History for one aircraft with `timestamp >= from_ts`, oldest first.
    /// With a limit, the newest `limit` rows are kept (still oldest first).
    pub fn query_history_range(
        &self,
        object_id: &str,
        from_ts: i64,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let conn = self.lock();
        let records = match limit {
            None => {
                let sql = format!(
                    "SELECT {HISTORY_COLUMNS} FROM position_history \
                     WHERE object_id = ?1 AND timestamp >= ?2 \
                     ORDER BY timestamp ASC, id ASC"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![object_id, from_ts], history_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            Some(limit) => {
                let sql = format!(
                    "SELECT {HISTORY_COLUMNS} FROM position_history \
                     WHERE object_id = ?1 AND timestamp >= ?2 \
                     ORDER BY timestamp DESC, id DESC LIMIT ?3"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(
                    params![object_id, from_ts, limit as i64],
                    history_from_row,
                )?;
                let mut newest_first = rows.collect::<Result<Vec<_>, _>>()?;
                newest_first.reverse();
                newest_first
            }
        };
        Ok(records)
    }

    pub fn query_current_states(
        &self,
        filter: StateFilter,
    ) -> Result<Vec<CurrentState>, StorageError> {
        let predicate = match filter {
            StateFilter::All => "",
            StateFilter::Airborne => "WHERE on_ground = 0",
        };
        let sql = format!(
            "SELECT {CURRENT_STATE_COLUMNS} FROM current_state {predicate} ORDER BY object_id"
        );

        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], current_state_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_current_state(&self, object_id: &str) -> Result<Option<CurrentState>, StorageError> {
        let sql = format!("SELECT {CURRENT_STATE_COLUMNS} FROM current_state WHERE object_id = ?1");
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt
            .query_row(params![object_id], current_state_from_row)
            .optional()?)
    }

    pub fn airborne_ids(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached("SELECT object_id FROM current_state WHERE on_ground = 0 ORDER BY object_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_history(&self) -> Result<usize, StorageError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM position_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Cheap round trip used by the health endpoint.
    pub fn ping(&self) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Write operations available inside [`Storage::write`].
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

impl StoreTx<'_> {
    /// Inserts or replaces the current state for the frame's aircraft.
    /// Analytics fields and `created_at` of an existing row are left alone.
    pub fn upsert_current_state(
        &self,
        enriched: &EnrichedFrame,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let frame = &enriched.frame;
        let (latitude, longitude) = split_position(enriched);
        let now = now.timestamp();

        self.conn
            .prepare_cached(
                "INSERT INTO current_state (
                    object_id, callsign, origin_country, latitude, longitude,
                    baro_altitude, geo_altitude, velocity, true_track, vertical_rate,
                    on_ground, squawk, spi, position_source, time_position, last_contact,
                    flight_phase, distance_km, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
                ON CONFLICT(object_id) DO UPDATE SET
                    callsign = excluded.callsign,
                    origin_country = excluded.origin_country,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    baro_altitude = excluded.baro_altitude,
                    geo_altitude = excluded.geo_altitude,
                    velocity = excluded.velocity,
                    true_track = excluded.true_track,
                    vertical_rate = excluded.vertical_rate,
                    on_ground = excluded.on_ground,
                    squawk = excluded.squawk,
                    spi = excluded.spi,
                    position_source = excluded.position_source,
                    time_position = excluded.time_position,
                    last_contact = excluded.last_contact,
                    flight_phase = excluded.flight_phase,
                    distance_km = excluded.distance_km,
                    updated_at = excluded.updated_at",
            )?
            .execute(params![
                frame.object_id,
                frame.callsign,
                frame.origin_country,
                latitude,
                longitude,
                frame.baro_altitude,
                frame.geo_altitude,
                frame.velocity,
                frame.true_track,
                frame.vertical_rate,
                frame.on_ground,
                frame.squawk,
                frame.spi,
                frame.position_source.map(|s| s.code()),
                frame.time_position,
                frame.last_contact,
                enriched.flight_phase.as_str(),
                enriched.distance_km,
                now,
            ])?;
        Ok(())
    }

    /// Appends one history row per frame. The observation time is the
    /// frame's own position time, falling back to `server_time`.
    /// `created_at` never goes backwards even if the wall clock does.
    pub fn append_history(
        &self,
        frames: &[EnrichedFrame],
        server_time: i64,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let last: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(created_at), 0) FROM position_history",
            [],
            |row| row.get(0),
        )?;
        let created_at = now.timestamp_millis().max(last);

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO position_history (
                object_id, callsign, timestamp, latitude, longitude, baro_altitude,
                geo_altitude, velocity, true_track, vertical_rate, on_ground,
                position_source, distance_km, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;

        for enriched in frames {
            let frame = &enriched.frame;
            let (latitude, longitude) = split_position(enriched);
            stmt.execute(params![
                frame.object_id,
                frame.callsign,
                frame.time_position.unwrap_or(server_time),
                latitude,
                longitude,
                frame.baro_altitude,
                frame.geo_altitude,
                frame.velocity,
                frame.true_track,
                frame.vertical_rate,
                frame.on_ground,
                frame.position_source.map(|s| s.code()),
                enriched.distance_km,
                created_at,
            ])?;
        }
        Ok(frames.len())
    }

    /// Drops current states whose last contact is older than `cutoff`
    /// (unix seconds). Rows without a last contact age by `updated_at`.
    pub fn delete_stale_states(&self, cutoff: i64) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "DELETE FROM current_state WHERE COALESCE(last_contact, updated_at) < ?1",
            params![cutoff],
        )?)
    }

    /// Drops history observed before `cutoff` (unix seconds).
    pub fn delete_history_before(&self, cutoff: i64) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "DELETE FROM position_history WHERE timestamp < ?1",
            params![cutoff],
        )?)
    }

    /// Returns false when the aircraft has no current state row.
    pub fn update_analytics(&self, update: &AnalyticsUpdate) -> Result<bool, StorageError> {
        let changed = self
            .conn
            .prepare_cached(
                "UPDATE current_state
                 SET altitude_trend = ?2, speed_trend = ?3, is_anomaly = ?4
                 WHERE object_id = ?1",
            )?
            .execute(params![
                update.object_id,
                update.altitude_trend.as_str(),
                update.speed_trend.as_str(),
                update.is_anomaly,
            ])?;
        Ok(changed > 0)
    }
}

fn split_position(enriched: &EnrichedFrame) -> (Option<f64>, Option<f64>) {
    match enriched.frame.position {
        Some(p) => (Some(p.latitude), Some(p.longitude)),
        None => (None, None),
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}

fn current_state_from_row(row: &Row<'_>) -> rusqlite::Result<CurrentState> {
    let phase: String = row.get("flight_phase")?;
    let speed_trend: Option<String> = row.get("speed_trend")?;
    let altitude_trend: Option<String> = row.get("altitude_trend")?;
    let position_source: Option<i64> = row.get("position_source")?;

    Ok(CurrentState {
        object_id: row.get("object_id")?,
        callsign: row.get("callsign")?,
        origin_country: row.get("origin_country")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        baro_altitude: row.get("baro_altitude")?,
        geo_altitude: row.get("geo_altitude")?,
        velocity: row.get("velocity")?,
        true_track: row.get("true_track")?,
        vertical_rate: row.get("vertical_rate")?,
        on_ground: row.get("on_ground")?,
        squawk: row.get("squawk")?,
        spi: row.get("spi")?,
        position_source: position_source.and_then(PositionSource::from_code),
        time_position: row.get("time_position")?,
        last_contact: row.get("last_contact")?,
        flight_phase: FlightPhase::parse(&phase).unwrap_or(FlightPhase::Unknown),
        distance_km: row.get("distance_km")?,
        speed_trend: speed_trend.as_deref().and_then(Trend::parse),
        altitude_trend: altitude_trend.as_deref().and_then(Trend::parse),
        is_anomaly: row.get("is_anomaly")?,
        created_at: timestamp(row.get("created_at")?),
        updated_at: timestamp(row.get("updated_at")?),
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let position_source: Option<i64> = row.get("position_source")?;

    Ok(HistoryRecord {
        id: row.get("id")?,
        object_id: row.get("object_id")?,
        callsign: row.get("callsign")?,
        timestamp: row.get("timestamp")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        baro_altitude: row.get("baro_altitude")?,
        geo_altitude: row.get("geo_altitude")?,
        velocity: row.get("velocity")?,
        true_track: row.get("true_track")?,
        vertical_rate: row.get("vertical_rate")?,
        on_ground: row.get("on_ground")?,
        position_source: position_source.and_then(PositionSource::from_code),
        distance_km: row.get("distance_km")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::enrich;
    use crate::source::{GeoPoint, StateFrame};
    use crate::testing::{frame, t0};
    use chrono::Duration;

    fn upsert(storage: &Storage, frame: StateFrame, now: DateTime<Utc>) {
        let enriched = enrich(frame, Some(GeoPoint::new(40.0, -74.0)));
        storage
            .write(|tx| tx.upsert_current_state(&enriched, now))
            .unwrap();
    }

    #[test]
    fn upsert_keeps_one_row_per_aircraft() {
        let storage = Storage::open_in_memory().unwrap();
        upsert(&storage, frame("a1", 40.0, -74.0), t0());
        upsert(&storage, frame("a1", 40.1, -74.0), t0() + Duration::seconds(10));

        let states = storage.query_current_states(StateFilter::All).unwrap();
        assert_eq!(states.len(), 1);
        let state = &states[0];
        assert_eq!(state.latitude, Some(40.1));
        assert_eq!(state.created_at, t0());
        assert_eq!(state.updated_at, t0() + Duration::seconds(10));
        assert_eq!(state.flight_phase, FlightPhase::Cruise);
        assert!(state.distance_km.unwrap() > 11.0);
    }

    #[test]
    fn upsert_preserves_analytics_fields() {
        let storage = Storage::open_in_memory().unwrap();
        upsert(&storage, frame("a1", 40.0, -74.0), t0());
        let updated = storage
            .write(|tx| {
                tx.update_analytics(&AnalyticsUpdate {
                    object_id: "a1".into(),
                    altitude_trend: Trend::Increasing,
                    speed_trend: Trend::Stable,
                    is_anomaly: true,
                })
            })
            .unwrap();
        assert!(updated);

        upsert(&storage, frame("a1", 40.2, -74.0), t0() + Duration::seconds(10));
        let state = storage.get_current_state("a1").unwrap().unwrap();
        assert_eq!(state.altitude_trend, Some(Trend::Increasing));
        assert_eq!(state.speed_trend, Some(Trend::Stable));
        assert!(state.is_anomaly);
        assert_eq!(state.latitude, Some(40.2));
    }

    #[test]
    fn analytics_update_for_unknown_aircraft_reports_false() {
        let storage = Storage::open_in_memory().unwrap();
        let updated = storage
            .write(|tx| {
                tx.update_analytics(&AnalyticsUpdate {
                    object_id: "zz".into(),
                    altitude_trend: Trend::Unknown,
                    speed_trend: Trend::Unknown,
                    is_anomaly: false,
                })
            })
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn history_is_append_only_and_ordered() {
        let storage = Storage::open_in_memory().unwrap();
        let mut first = frame("a1", 40.0, -74.0);
        first.time_position = Some(1_000);
        let mut second = frame("a1", 40.1, -74.0);
        second.time_position = None;
        let batch = vec![enrich(second, None), enrich(first, None)];

        storage
            .write(|tx| tx.append_history(&batch, 2_000, t0()))
            .unwrap();
        storage
            .write(|tx| tx.append_history(&batch[..1], 3_000, t0()))
            .unwrap();

        let history = storage.query_history_range("a1", 0, None).unwrap();
        let timestamps: Vec<i64> = history.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
        assert_eq!(storage.count_history().unwrap(), 3);

        let limited = storage.query_history_range("a1", 0, Some(2)).unwrap();
        let timestamps: Vec<i64> = limited.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![2_000, 3_000]);

        let recent = storage.query_history_range("a1", 1_500, None).unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn created_at_never_goes_backwards() {
        let storage = Storage::open_in_memory().unwrap();
        let batch = vec![enrich(frame("a1", 40.0, -74.0), None)];
        storage
            .write(|tx| tx.append_history(&batch, 0, t0()))
            .unwrap();
        storage
            .write(|tx| tx.append_history(&batch, 0, t0() - Duration::minutes(5)))
            .unwrap();

        let history = storage.query_history_range("a1", 0, None).unwrap();
        assert_eq!(history[0].created_at, t0().timestamp_millis());
        assert_eq!(history[1].created_at, t0().timestamp_millis());
        assert!(history[0].id < history[1].id);
    }

    #[test]
    fn failed_write_rolls_back() {
        let storage = Storage::open_in_memory().unwrap();
        let enriched = enrich(frame("a1", 40.0, -74.0), None);

        let result: Result<(), StorageError> = storage.write(|tx| {
            tx.upsert_current_state(&enriched, t0())?;
            tx.conn.execute_batch("DROP TABLE position_history")?;
            tx.append_history(std::slice::from_ref(&enriched), 0, t0())?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(storage.get_current_state("a1").unwrap().is_none());
        assert_eq!(storage.count_history().unwrap(), 0);
    }

    #[test]
    fn cleanup_removes_stale_rows() {
        let storage = Storage::open_in_memory().unwrap();
        let mut old = frame("a1", 40.0, -74.0);
        old.last_contact = Some(100);
        old.time_position = Some(100);
        let mut fresh = frame("a2", 40.0, -74.0);
        fresh.last_contact = Some(500);
        fresh.time_position = Some(500);
        let batch = vec![enrich(old, None), enrich(fresh, None)];

        storage
            .write(|tx| {
                for enriched in &batch {
                    tx.upsert_current_state(enriched, t0())?;
                }
                tx.append_history(&batch, 0, t0())
            })
            .unwrap();

        let (states, history) = storage
            .write(|tx| Ok((tx.delete_stale_states(400)?, tx.delete_history_before(400)?)))
            .unwrap();
        assert_eq!((states, history), (1, 1));

        let ids: Vec<String> = storage
            .query_current_states(StateFilter::All)
            .unwrap()
            .into_iter()
            .map(|s| s.object_id)
            .collect();
        assert_eq!(ids, vec!["a2"]);
        assert_eq!(storage.query_history_range("a1", 0, None).unwrap().len(), 0);
    }

    #[test]
    fn airborne_filter_skips_ground_traffic() {
        let storage = Storage::open_in_memory().unwrap();
        let mut taxiing = frame("g1", 40.0, -74.0);
        taxiing.on_ground = true;
        upsert(&storage, taxiing, t0());
        upsert(&storage, frame("a1", 40.0, -74.0), t0());

        let airborne = storage.query_current_states(StateFilter::Airborne).unwrap();
        assert_eq!(airborne.len(), 1);
        assert_eq!(airborne[0].object_id, "a1");
        assert_eq!(storage.airborne_ids().unwrap(), vec!["a1"]);
        assert_eq!(storage.query_current_states(StateFilter::All).unwrap().len(), 2);
    }

    #[test]
    fn opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flightwall.db");
        let storage = Storage::open(&path).unwrap();
        storage.ping().unwrap();
        upsert(&storage, frame("a1", 40.0, -74.0), t0());
        drop(storage);

        let reopened = Storage::open(&path).unwrap();
        assert!(reopened.get_current_state("a1").unwrap().is_some());
    }
}
