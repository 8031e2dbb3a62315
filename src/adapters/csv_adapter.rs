//! CSV file price adapter.
//!
//! Reads the combined history file the fetch scripts produce, one row per
//! (symbol, day):
//!
//! ```text
//! Timestamp,Code,Open,Close,Low,High,Volume
//! 2024-07-10,AAPL,229.3,232.98,228.65,233.08,62627700
//! ```

use crate::domain::error::MeanrevError;
use crate::domain::observation::PriceObservation;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Open", default)]
    open: Option<f64>,
    #[serde(rename = "Close", default)]
    close: Option<f64>,
    #[serde(rename = "Low", default)]
    low: Option<f64>,
    #[serde(rename = "High", default)]
    high: Option<f64>,
    #[serde(rename = "Volume", default)]
    volume: Option<f64>,
}

impl CsvRow {
    fn into_observation(self, line: u64) -> Result<(String, PriceObservation), MeanrevError> {
        let date = NaiveDate::parse_from_str(self.timestamp.trim(), "%Y-%m-%d").map_err(|e| {
            MeanrevError::Database {
                reason: format!("line {line}: invalid date {:?}: {e}", self.timestamp),
            }
        })?;

        let mut obs = PriceObservation::new(date, self.close.unwrap_or(f64::NAN));
        if let Some(v) = self.open {
            obs = obs.with_field("open", v);
        }
        if let Some(v) = self.high {
            obs = obs.with_field("high", v);
        }
        if let Some(v) = self.low {
            obs = obs.with_field("low", v);
        }
        if let Some(v) = self.volume {
            obs = obs.with_field("volume", volume_value(v));
        }
        Ok((self.code.trim().to_uppercase(), obs))
    }
}

/// Whole-number volumes are written as JSON integers.
pub(crate) fn volume_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Every row in the file as (symbol, observation), in file order.
    pub fn load_all(&self) -> Result<Vec<(String, PriceObservation)>, MeanrevError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| MeanrevError::Database {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut rows = Vec::new();
        for result in rdr.deserialize::<CsvRow>() {
            let row = result.map_err(|e| MeanrevError::Database {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = rows.len() as u64 + 2;
            rows.push(row.into_observation(line)?);
        }

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "loaded price csv");
        Ok(rows)
    }

    /// Every observation for `symbol`, ascending by date.
    pub fn fetch_all(&self, symbol: &str) -> Result<Vec<PriceObservation>, MeanrevError> {
        let symbol = symbol.to_uppercase();
        let mut observations: Vec<PriceObservation> = self
            .load_all()?
            .into_iter()
            .filter(|(code, _)| *code == symbol)
            .map(|(_, obs)| obs)
            .collect();
        observations.sort_by_key(|o| o.date);
        Ok(observations)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, MeanrevError> {
        Ok(self
            .fetch_all(symbol)?
            .into_iter()
            .filter(|obs| obs.date >= start_date && obs.date <= end_date)
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, MeanrevError> {
        let symbols: BTreeSet<String> = self
            .load_all()?
            .into_iter()
            .map(|(code, _)| code)
            .collect();
        Ok(symbols.into_iter().collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MeanrevError> {
        let symbol = symbol.to_uppercase();
        let dates: Vec<NaiveDate> = self
            .load_all()?
            .into_iter()
            .filter(|(code, _)| *code == symbol)
            .map(|(_, obs)| obs.date)
            .collect();

        match (dates.iter().min(), dates.iter().max()) {
            (Some(&min), Some(&max)) => Ok(Some((min, max, dates.len()))),
            _ => Ok(None),
        }
    }
}
