//! SQLite price store over the `stocks_daily` and `market_index_daily` tables.

use crate::domain::error::MeanrevError;
use crate::domain::observation::PriceObservation;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS stocks_daily (
        stock_symbol TEXT NOT NULL,
        stock_date TEXT NOT NULL,
        open_price REAL,
        close_price REAL,
        low REAL,
        high REAL,
        volume INTEGER,
        \"return\" REAL,
        PRIMARY KEY (stock_symbol, stock_date)
    );
    CREATE INDEX IF NOT EXISTS idx_stocks_daily_date ON stocks_daily(stock_date);
    CREATE TABLE IF NOT EXISTS market_index_daily (
        stock_date TEXT NOT NULL PRIMARY KEY,
        open_price REAL,
        close_price REAL,
        low REAL,
        high REAL,
        volume INTEGER,
        \"return\" REAL
    );";

type DataRange = Option<(NaiveDate, NaiveDate, usize)>;

fn db_err(e: r2d2::Error) -> MeanrevError {
    MeanrevError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> MeanrevError {
    MeanrevError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, MeanrevError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| MeanrevError::Database {
        reason: format!("invalid stock_date {raw:?}: {e}"),
    })
}

/// Whole-number volume as stored in the INTEGER column.
fn volume_column(obs: &PriceObservation) -> Result<Option<i64>, MeanrevError> {
    let Some(value) = obs.extra.get("volume").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    if let Some(v) = value.as_i64() {
        return Ok(Some(v));
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Some(f as i64))
        }
        _ => Err(MeanrevError::DatabaseQuery {
            reason: format!("volume on {} is not a whole number: {value}", obs.date),
        }),
    }
}

struct PriceColumns {
    date: String,
    open: Option<f64>,
    close: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
    volume: Option<i64>,
}

impl PriceColumns {
    fn from_observation(obs: &PriceObservation) -> Result<Self, MeanrevError> {
        let field = |key: &str| obs.extra.get(key).and_then(|v| v.as_f64());
        Ok(Self {
            date: obs.date.format("%Y-%m-%d").to_string(),
            open: field("open"),
            close: obs.close_price.is_finite().then_some(obs.close_price),
            low: field("low"),
            high: field("high"),
            volume: volume_column(obs)?,
        })
    }
}

fn range_from_row(
    result: (Option<String>, Option<String>, i64),
) -> Result<DataRange, MeanrevError> {
    match result {
        (Some(min_str), Some(max_str), count) if count > 0 => Ok(Some((
            parse_date(&min_str)?,
            parse_date(&max_str)?,
            count as usize,
        ))),
        _ => Ok(None),
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, MeanrevError> {
        let db_path = config.require_string("sqlite", "path")?;
        let raw_pool_size = config.get_int("sqlite", "pool_size", 4);
        let pool_size = u32::try_from(raw_pool_size)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| MeanrevError::ConfigInvalid {
                section: "sqlite".into(),
                key: "pool_size".into(),
                reason: format!("must be between 1 and {}, got {raw_pool_size}", u32::MAX),
            })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        tracing::debug!(path = %db_path, pool_size, "opened sqlite store");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, MeanrevError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, MeanrevError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), MeanrevError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Upsert a series for one symbol in a single transaction. Returns rows written.
    pub fn insert_observations(
        &self,
        symbol: &str,
        observations: &[PriceObservation],
    ) -> Result<usize, MeanrevError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO stocks_daily
                        (stock_symbol, stock_date, open_price, close_price, low, high, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;

            for obs in observations {
                let c = PriceColumns::from_observation(obs)?;
                stmt.execute(params![symbol, c.date, c.open, c.close, c.low, c.high, c.volume])
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(observations.len())
    }

    /// Upsert the benchmark index series (one row per day) in a single transaction.
    pub fn insert_market_index(
        &self,
        observations: &[PriceObservation],
    ) -> Result<usize, MeanrevError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO market_index_daily
                        (stock_date, open_price, close_price, low, high, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(query_err)?;

            for obs in observations {
                let c = PriceColumns::from_observation(obs)?;
                stmt.execute(params![c.date, c.open, c.close, c.low, c.high, c.volume])
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(observations.len())
    }

    /// First date, last date and row count of the benchmark index series.
    pub fn market_index_range(&self) -> Result<DataRange, MeanrevError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(stock_date), MAX(stock_date), COUNT(*) FROM market_index_daily",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;
        range_from_row(result)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, MeanrevError> {
        let conn = self.conn()?;

        let start_str = start_date.format("%Y-%m-%d").to_string();
        let end_str = end_date.format("%Y-%m-%d").to_string();

        let query = "SELECT stock_date, open_price, close_price, low, high, volume
                     FROM stocks_daily
                     WHERE stock_symbol = ?1 AND stock_date >= ?2 AND stock_date <= ?3
                     ORDER BY stock_date ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;

        type Row = (
            String,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<i64>,
        );
        let rows = stmt
            .query_map(params![symbol, start_str, end_str], |row| {
                Ok::<Row, rusqlite::Error>((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(query_err)?;

        let mut observations = Vec::new();
        for row in rows {
            let (date, open, close, low, high, volume) = row.map_err(query_err)?;
            let mut obs = PriceObservation::new(parse_date(&date)?, close.unwrap_or(f64::NAN));
            if let Some(v) = open {
                obs = obs.with_field("open", v);
            }
            if let Some(v) = high {
                obs = obs.with_field("high", v);
            }
            if let Some(v) = low {
                obs = obs.with_field("low", v);
            }
            if let Some(v) = volume {
                obs = obs.with_field("volume", v);
            }
            observations.push(obs);
        }

        Ok(observations)
    }

    fn list_symbols(&self) -> Result<Vec<String>, MeanrevError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT stock_symbol FROM stocks_daily ORDER BY stock_symbol")
            .map_err(query_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_err)?);
        }
        Ok(symbols)
    }

    fn get_data_range(&self, symbol: &str) -> Result<DataRange, MeanrevError> {
        let conn = self.conn()?;

        let query = "SELECT MIN(stock_date), MAX(stock_date), COUNT(*)
                     FROM stocks_daily WHERE stock_symbol = ?1";

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(query, params![symbol], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(query_err)?;
        range_from_row(result)
    }
}
