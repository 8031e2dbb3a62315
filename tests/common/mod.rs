#![allow(dead_code)]

use chrono::NaiveDate;
use meanrev::domain::error::MeanrevError;
pub use meanrev::domain::observation::PriceObservation;
use meanrev::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceObservation>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, symbol: &str, series: Vec<PriceObservation>) -> Self {
        self.data.insert(symbol.to_string(), series);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, MeanrevError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(MeanrevError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|o| o.date >= start_date && o.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, MeanrevError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MeanrevError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(MeanrevError::DatabaseQuery {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(series) if !series.is_empty() => {
                let min = series.iter().map(|o| o.date).min().unwrap();
                let max = series.iter().map(|o| o.date).max().unwrap();
                Ok(Some((min, max, series.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One observation per calendar day starting at `start`.
pub fn series_from(start: &str, closes: &[f64]) -> Vec<PriceObservation> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceObservation::new(start + chrono::Duration::days(i as i64), close))
        .collect()
}

/// A gently trending series with a periodic wobble, so no window is flat.
pub fn generate_series(start: &str, count: usize, start_price: f64) -> Vec<PriceObservation> {
    let closes: Vec<f64> = (0..count)
        .map(|i| start_price + i as f64 * 0.5 + ((i % 5) as f64 - 2.0) * 1.5)
        .collect();
    series_from(start, &closes)
}
