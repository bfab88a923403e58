//! SQL-backed observation store.
//!
//! One table, `weather_observations`, keyed by `UNIQUE(station_code,
//! timestamp)`. Timestamps are stored as fixed-width UTC text so that text
//! comparison and ordering match time order in both `SQLite` and
//! `PostgreSQL`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use marine_weather_models::{Observation, ObservationQuery, time};
use moosicbox_json_utils::database::ToValue as _;
use strum_macros::{AsRefStr, Display, EnumString};
use switchy_database::{Database, DatabaseValue};
use switchy_database_connection::{Credentials, init_sqlite_rusqlite};

use crate::{ObservationStore, StoreError, dedup_last};

/// Default location of the `SQLite` database file.
pub const DEFAULT_SQLITE_PATH: &str = "data/weather_data.db";

const COLUMNS: &str = "id, station_code, station_name, timestamp, wind_direction, \
                       wind_speed, wave_height, created_at";

const UPSERT_SQL: &str = "INSERT INTO weather_observations
     (station_code, station_name, timestamp, wind_direction, wind_speed, wave_height, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7)
     ON CONFLICT (station_code, timestamp) DO UPDATE SET
       station_name = excluded.station_name,
       wind_direction = excluded.wind_direction,
       wind_speed = excluded.wind_speed,
       wave_height = excluded.wave_height";

/// SQL flavor of the backing database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Dialect {
    /// `SQLite` via rusqlite.
    Sqlite,
    /// `PostgreSQL`.
    Postgres,
}

impl Dialect {
    const fn id_column(self) -> &'static str {
        match self {
            Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "id BIGSERIAL PRIMARY KEY",
        }
    }

    const fn real_type(self) -> &'static str {
        match self {
            Self::Sqlite => "REAL",
            Self::Postgres => "DOUBLE PRECISION",
        }
    }
}

/// Observation store over a `switchy_database` connection.
pub struct SqlStore {
    db: Box<dyn Database>,
    dialect: Dialect,
}

impl SqlStore {
    /// Wraps an open connection and creates the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if schema creation fails.
    pub async fn new(db: Box<dyn Database>, dialect: Dialect) -> Result<Self, StoreError> {
        let store = Self { db, dialect };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Opens (or creates) a `SQLite` database file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the directory or database cannot be
    /// created.
    pub async fn open_sqlite(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let db = init_sqlite_rusqlite(Some(path)).map_err(|e| StoreError::Database(e.to_string()))?;
        log::info!("Opened SQLite store at {}", path.display());
        Self::new(db, Dialect::Sqlite).await
    }

    /// Connects to `PostgreSQL` at `url`.
    ///
    /// Query parameters (e.g. `?sslmode=require`) are stripped before the
    /// URL is parsed; TLS is negotiated by the connector.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the URL is invalid or the
    /// connection fails.
    pub async fn connect_postgres(url: &str) -> Result<Self, StoreError> {
        let url_base = url.split('?').next().unwrap_or(url);
        let creds =
            Credentials::from_url(url_base).map_err(|e| StoreError::Database(e.to_string()))?;
        let db = switchy_database_connection::init_postgres_raw_native_tls(creds)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        log::info!("Connected to PostgreSQL store");
        Self::new(db, Dialect::Postgres).await
    }

    /// Returns the SQL flavor of this store.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let real = self.dialect.real_type();
        self.exec(&format!(
            "CREATE TABLE IF NOT EXISTS weather_observations (
                {id},
                station_code   TEXT NOT NULL,
                station_name   TEXT NOT NULL,
                timestamp      TEXT NOT NULL,
                wind_direction TEXT,
                wind_speed     {real},
                wave_height    {real},
                created_at     TEXT NOT NULL,
                UNIQUE(station_code, timestamp)
            )",
            id = self.dialect.id_column(),
        ))
        .await?;

        self.exec(
            "CREATE INDEX IF NOT EXISTS idx_weather_station_timestamp
             ON weather_observations (station_code, timestamp)",
        )
        .await?;

        self.exec(
            "CREATE INDEX IF NOT EXISTS idx_weather_timestamp
             ON weather_observations (timestamp)",
        )
        .await
    }

    async fn exec(&self, sql: &str) -> Result<(), StoreError> {
        self.db
            .exec_raw(sql)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn select(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Vec<Observation>, StoreError> {
        let rows = self
            .db
            .query_raw_params(sql, params)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(row_to_observation).collect()
    }
}

fn opt_string(value: Option<&str>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.to_owned()))
}

fn opt_f64(value: Option<f64>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, DatabaseValue::Real64)
}

fn parse_stored_instant(text: &str, column: &str) -> Result<chrono::DateTime<Utc>, StoreError> {
    time::from_canonical(text).ok_or_else(|| StoreError::Conversion {
        message: format!("invalid {column} '{text}'"),
    })
}

fn row_to_observation(row: &switchy_database::Row) -> Result<Observation, StoreError> {
    let conversion = |column: &str, e: &dyn std::fmt::Display| StoreError::Conversion {
        message: format!("column {column}: {e}"),
    };

    let id: i64 = row.to_value("id").map_err(|e| conversion("id", &e))?;
    let timestamp: String = row
        .to_value("timestamp")
        .map_err(|e| conversion("timestamp", &e))?;
    let created_at: String = row
        .to_value("created_at")
        .map_err(|e| conversion("created_at", &e))?;

    let station_code: String = row
        .to_value("station_code")
        .map_err(|e| conversion("station_code", &e))?;
    let station_name: String = row
        .to_value("station_name")
        .map_err(|e| conversion("station_name", &e))?;
    let wind_direction: Option<String> = row
        .to_value("wind_direction")
        .map_err(|e| conversion("wind_direction", &e))?;
    let wind_speed: Option<f64> = row
        .to_value("wind_speed")
        .map_err(|e| conversion("wind_speed", &e))?;
    let wave_height: Option<f64> = row
        .to_value("wave_height")
        .map_err(|e| conversion("wave_height", &e))?;

    Ok(Observation {
        id: Some(id),
        station_code,
        station_name,
        timestamp: parse_stored_instant(&timestamp, "timestamp")?,
        wind_direction,
        wind_speed,
        wave_height,
        created_at: Some(parse_stored_instant(&created_at, "created_at")?),
    })
}

#[async_trait]
impl ObservationStore for SqlStore {
    async fn upsert(&self, observations: &[Observation]) -> Result<u64, StoreError> {
        let unique = dedup_last(observations);
        let now = time::to_canonical(Utc::now());

        let txn = self
            .db
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for obs in &unique {
            let result = txn
                .exec_raw_params(
                    UPSERT_SQL,
                    &[
                        DatabaseValue::String(obs.station_code.clone()),
                        DatabaseValue::String(obs.station_name.clone()),
                        DatabaseValue::String(time::to_canonical(obs.timestamp)),
                        opt_string(obs.wind_direction.as_deref()),
                        opt_f64(obs.wind_speed),
                        opt_f64(obs.wave_height),
                        DatabaseValue::String(now.clone()),
                    ],
                )
                .await;

            if let Err(e) = result {
                log::error!(
                    "Upsert of {} at {} failed, rolling back batch of {}: {e}",
                    obs.station_code,
                    time::to_canonical(obs.timestamp),
                    unique.len()
                );
                if let Err(rollback) = txn.rollback().await {
                    log::warn!("Rollback failed: {rollback}");
                }
                return Err(StoreError::Database(e.to_string()));
            }
        }

        txn.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        log::info!("Upserted {} observations ({})", unique.len(), self.dialect);
        Ok(unique.len() as u64)
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        let mut sql = format!("SELECT {COLUMNS} FROM weather_observations WHERE 1=1");
        let mut params: Vec<DatabaseValue> = Vec::new();

        if let Some(start) = query.start {
            params.push(DatabaseValue::String(time::to_canonical(start)));
            sql.push_str(&format!(" AND timestamp >= ${}", params.len()));
        }
        if let Some(end) = query.end {
            params.push(DatabaseValue::String(time::to_canonical(end)));
            sql.push_str(&format!(" AND timestamp <= ${}", params.len()));
        }
        if let Some(code) = &query.station_code {
            params.push(DatabaseValue::String(code.clone()));
            sql.push_str(&format!(" AND station_code = ${}", params.len()));
        }

        sql.push_str(" ORDER BY timestamp DESC, station_code ASC");

        if let Some(limit) = query.limit {
            params.push(DatabaseValue::Int64(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }

        self.select(&sql, &params).await
    }

    async fn latest(&self) -> Result<BTreeMap<String, Observation>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM weather_observations o
             WHERE o.timestamp = (
                 SELECT MAX(i.timestamp) FROM weather_observations i
                 WHERE i.station_code = o.station_code
             )"
        );

        Ok(self
            .select(&sql, &[])
            .await?
            .into_iter()
            .map(|obs| (obs.station_code.clone(), obs))
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let rows = self
            .db
            .query_raw_params("SELECT COUNT(*) AS total FROM weather_observations", &[])
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let total: i64 = rows
            .first()
            .map_or(Ok(0), |row| row.to_value("total"))
            .map_err(|e| StoreError::Conversion {
                message: format!("column total: {e}"),
            })?;

        u64::try_from(total).map_err(|e| StoreError::Conversion {
            message: format!("negative count {total}: {e}"),
        })
    }
}
