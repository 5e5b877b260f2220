// src/store.rs
//! Snapshot persistence: wholesale replace of the live tables plus refresh-status rows.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::model::{coord_from_key, coord_key, ForecastPoint, HazardWarning, RefreshStatus, SeverityLevel};

pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

/// Write side used by the orchestrator.
pub trait SnapshotStore: Send + Sync {
    /// Delete every warning and insert `warnings`, atomically.
    fn replace_warnings(&self, warnings: &[HazardWarning]) -> Result<(), StoreError>;
    /// Delete every forecast point and insert `points`, atomically.
    fn replace_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError>;
    /// Upsert the pipeline row. `succeeded` advances `last_success_at`; `error`
    /// (blank counts as none) is stored as-is, so a degraded success keeps its notes.
    fn update_refresh_status(
        &self,
        pipeline: &str,
        error: Option<&str>,
        succeeded: bool,
    ) -> Result<(), StoreError>;
    fn get_last_refresh(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// SQLite-backed store. One connection; the mutex serializes writers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn fmt_ts(dt: &DateTime<Utc>) -> String {
    // fixed width so text order is time order
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{raw:?}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > SNAPSHOT_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        if current < 1 {
            let conn = self.lock()?;
            conn.execute_batch(include_str!("../migrations/0001_snapshot_schema.sql"))?;
            conn.execute("PRAGMA user_version = 1", [])?;
        }
        Ok(())
    }

    /// Current warnings, newest first, optionally limited to one region.
    pub fn list_warnings(&self, region: Option<&str>) -> Result<Vec<HazardWarning>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "
            SELECT source, title, level, hazard_kind, region, issued_at, expires_at,
                   detail_url, summary, confidence
            FROM hazard_warnings
            WHERE (?1 IS NULL OR region = ?1)
            ORDER BY issued_at DESC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![region], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, f64>(9)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (source, title, level, hazard_kind, region, issued, expires, detail_url, summary, confidence) =
                row?;
            out.push(HazardWarning {
                source,
                title,
                level: SeverityLevel::from_label(&level),
                hazard_kind,
                region,
                issued_at: parse_ts(&issued)?,
                expires_at: parse_opt_ts(expires)?,
                detail_url,
                summary,
                confidence,
            });
        }
        Ok(out)
    }

    /// Points for the rounded coordinates, oldest forecast first. When none match,
    /// the most recently ingested location is returned instead of an empty set.
    pub fn list_forecast(&self, lat: f64, lon: f64) -> Result<Vec<ForecastPoint>, StoreError> {
        let conn = self.lock()?;
        let exact = query_points(
            &conn,
            "
            SELECT lat_e4, lon_e4, location_label, region, forecast_at, temperature_c,
                   humidity_pct, source
            FROM forecast_points
            WHERE lat_e4 = ?1 AND lon_e4 = ?2
            ORDER BY forecast_at ASC, id ASC
            ",
            coord_key(lat),
            coord_key(lon),
        )?;
        if !exact.is_empty() {
            return Ok(exact);
        }

        let latest: Option<(i64, i64)> = conn
            .query_row(
                "SELECT lat_e4, lon_e4 FROM forecast_points ORDER BY ingested_at DESC, id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((lat_e4, lon_e4)) = latest else {
            return Ok(Vec::new());
        };
        query_points(
            &conn,
            "
            SELECT lat_e4, lon_e4, location_label, region, forecast_at, temperature_c,
                   humidity_pct, source
            FROM forecast_points
            WHERE lat_e4 = ?1 AND lon_e4 = ?2
            ORDER BY ingested_at DESC, forecast_at ASC, id ASC
            ",
            lat_e4,
            lon_e4,
        )
    }

    pub fn get_refresh_status(&self, pipeline: &str) -> Result<Option<RefreshStatus>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT pipeline, last_success_at, last_error, updated_at FROM refresh_status WHERE pipeline = ?1",
                [pipeline],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        raw.map(|(pipeline, last_success, last_error, updated)| -> Result<_, StoreError> {
            Ok(RefreshStatus {
                pipeline,
                last_success_at: parse_opt_ts(last_success)?,
                last_error,
                updated_at: parse_ts(&updated)?,
            })
        })
        .transpose()
    }
}

fn query_points(
    conn: &Connection,
    sql: &str,
    lat_e4: i64,
    lon_e4: i64,
) -> Result<Vec<ForecastPoint>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![lat_e4, lon_e4], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (lat, lon, location_label, region, at, temperature_c, humidity_pct, source) = row?;
        out.push(ForecastPoint {
            lat: coord_from_key(lat),
            lon: coord_from_key(lon),
            location_label,
            region,
            forecast_at: parse_ts(&at)?,
            temperature_c,
            humidity_pct,
            source,
        });
    }
    Ok(out)
}

impl SnapshotStore for SqliteStore {
    fn replace_warnings(&self, warnings: &[HazardWarning]) -> Result<(), StoreError> {
        let ingested_at = fmt_ts(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM hazard_warnings", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO hazard_warnings (
                    source, title, level, hazard_kind, region, issued_at, expires_at,
                    detail_url, summary, confidence, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
            )?;
            for w in warnings {
                let w = w.clone().normalized();
                stmt.execute(params![
                    w.source,
                    w.title,
                    w.level.as_str(),
                    w.hazard_kind,
                    w.region,
                    fmt_ts(&w.issued_at),
                    w.expires_at.as_ref().map(fmt_ts),
                    w.detail_url,
                    w.summary,
                    w.confidence,
                    ingested_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn replace_forecast(&self, points: &[ForecastPoint]) -> Result<(), StoreError> {
        let ingested_at = fmt_ts(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM forecast_points", [])?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO forecast_points (
                    lat_e4, lon_e4, location_label, region, forecast_at, temperature_c,
                    humidity_pct, source, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;
            for p in points {
                stmt.execute(params![
                    coord_key(p.lat),
                    coord_key(p.lon),
                    p.location_label,
                    p.region,
                    fmt_ts(&p.forecast_at),
                    p.temperature_c,
                    p.humidity_pct,
                    p.source,
                    ingested_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn update_refresh_status(
        &self,
        pipeline: &str,
        error: Option<&str>,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        let now = fmt_ts(&Utc::now());
        let error = error.map(str::trim).filter(|e| !e.is_empty());
        let success_at = succeeded.then(|| now.clone());
        let conn = self.lock()?;
        conn.execute(
            "
            INSERT INTO refresh_status (pipeline, last_success_at, last_error, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(pipeline) DO UPDATE SET
                last_success_at = COALESCE(excluded.last_success_at, refresh_status.last_success_at),
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            ",
            params![pipeline, success_at, error, now],
        )?;
        Ok(())
    }

    fn get_last_refresh(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT last_success_at FROM refresh_status WHERE pipeline = ?1",
                [pipeline],
                |row| row.get(0),
            )
            .optional()?;
        parse_opt_ts(raw.flatten())
    }
}
