//! PostgreSQL price store over the `stocks_daily` table.

use crate::domain::error::MeanrevError;
use crate::domain::observation::PriceObservation;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::cell::RefCell;


const ENV_KEYS: [(&str, &str); 5] = [
    ("host", "DATABASE_HOST"),
    ("port", "DATABASE_PORT"),
    ("dbname", "DATABASE_NAME"),
    ("user", "DATABASE_USER"),
    ("password", "DATABASE_PASSWORD"),
];

pub struct PostgresAdapter {
    client: RefCell<Client>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, MeanrevError> {
        let connection_string = resolve_connection_string(config, |key| std::env::var(key).ok())?;

        let client =
            Client::connect(&connection_string, NoTls).map_err(|e| MeanrevError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: RefCell::new(client),
        })
    }

    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<postgres::Row>, MeanrevError> {
        self.client
            .borrow_mut()
            .query(sql, params)
            .map_err(|e| MeanrevError::DatabaseQuery {
                reason: e.to_string(),
            })
    }
}

/// `[postgres] connection_string`, then `[database] conninfo`, then `DATABASE_*` variables.
pub fn resolve_connection_string(
    config: &dyn ConfigPort,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, MeanrevError> {
    if let Some(s) = config
        .get_string("postgres", "connection_string")
        .or_else(|| config.get_string("database", "conninfo"))
        .filter(|s| !s.trim().is_empty())
    {
        return Ok(s);
    }

    let parts: Vec<String> = ENV_KEYS
        .iter()
        .filter_map(|(param, var)| env(var).map(|v| format!("{param}={v}")))
        .collect();

    if env("DATABASE_NAME").is_none() {
        return Err(MeanrevError::ConfigMissing {
            section: "database".into(),
            key: "conninfo".into(),
        });
    }
    Ok(parts.join(" "))
}

impl DataPort for PostgresAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, MeanrevError> {
        let query = "SELECT stock_date::date, \
                            open_price::double precision, close_price::double precision, \
                            low::double precision, high::double precision, \
                            volume::bigint \
                     FROM stocks_daily \
                     WHERE stock_symbol = $1 AND stock_date >= $2 AND stock_date <= $3 \
                     ORDER BY stock_date ASC";

        let rows = self.query(query, &[&symbol, &start_date, &end_date])?;

        let observations = rows
            .into_iter()
            .map(|row| {
                let close: Option<f64> = row.get(2);
                let mut obs = PriceObservation::new(row.get(0), close.unwrap_or(f64::NAN));
                if let Some(v) = row.get::<_, Option<f64>>(1) {
                    obs = obs.with_field("open", v);
                }
                if let Some(v) = row.get::<_, Option<f64>>(4) {
                    obs = obs.with_field("high", v);
                }
                if let Some(v) = row.get::<_, Option<f64>>(3) {
                    obs = obs.with_field("low", v);
                }
                if let Some(v) = row.get::<_, Option<i64>>(5) {
                    obs = obs.with_field("volume", v);
                }
                obs
            })
            .collect();

        Ok(observations)
    }

    fn list_symbols(&self) -> Result<Vec<String>, MeanrevError> {
        let rows = self.query(
            "SELECT DISTINCT stock_symbol FROM stocks_daily ORDER BY stock_symbol",
            &[],
        )?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MeanrevError> {
        let rows = self.query(
            "SELECT MIN(stock_date)::date, MAX(stock_date)::date, COUNT(*) \
             FROM stocks_daily WHERE stock_symbol = $1",
            &[&symbol],
        )?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_connection_string_wins() {
        let config = FileConfigAdapter::from_string(
            "[postgres]\nconnection_string = host=db dbname=stocks\n",
        )
        .unwrap();
        let s = resolve_connection_string(&config, env_of(&[("DATABASE_NAME", "other")])).unwrap();
        assert_eq!(s, "host=db dbname=stocks");
    }

    #[test]
    fn falls_back_to_database_conninfo() {
        let config =
            FileConfigAdapter::from_string("[database]\nconninfo = host=localhost dbname=x\n")
                .unwrap();
        let s = resolve_connection_string(&config, env_of(&[])).unwrap();
        assert_eq!(s, "host=localhost dbname=x");
    }

    #[test]
    fn builds_from_environment() {
        let config = FileConfigAdapter::empty();
        let s = resolve_connection_string(
            &config,
            env_of(&[
                ("DATABASE_HOST", "localhost"),
                ("DATABASE_PORT", "5432"),
                ("DATABASE_NAME", "stocks"),
                ("DATABASE_USER", "app"),
            ]),
        )
        .unwrap();
        assert_eq!(s, "host=localhost port=5432 dbname=stocks user=app");
    }

    #[test]
    fn missing_everything_is_config_missing() {
        let config = FileConfigAdapter::empty();
        match resolve_connection_string(&config, env_of(&[("DATABASE_HOST", "h")])) {
            Err(MeanrevError::ConfigMissing { section, key }) => {
                assert_eq!(section, "database");
                assert_eq!(key, "conninfo");
            }
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
    }
}
