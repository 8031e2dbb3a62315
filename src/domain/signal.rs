//! Mean-reversion signal computation.
//!
//! For every observation with a full trailing window of `window` closes
//! (itself included):
//!
//! - `moving_average` = mean of the window
//! - `std_dev` = sample standard deviation of the window (N-1 denominator)
//! - `z_score` = (close - moving_average) / std_dev
//! - `buy_signal` = z_score < buy_below, `sell_signal` = z_score > sell_above
//!
//! Observations without a full window, windows with zero variance and windows
//! touching a non-finite close produce no record. Output order follows input
//! order; callers supply the series sorted by date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::MeanrevError;
use crate::domain::observation::PriceObservation;
use crate::domain::window::{MIN_WINDOW, RollingWindow};

pub const DEFAULT_WINDOW: usize = 15;
pub const DEFAULT_BUY_BELOW: f64 = -1.0;
pub const DEFAULT_SELL_ABOVE: f64 = 1.0;

const RECORD_FIELDS: [&str; 7] = [
    "date",
    "close_price",
    "moving_average",
    "std_dev",
    "z_score",
    "buy_signal",
    "sell_signal",
];

/// Lookback and z-score thresholds for one computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParams {
    pub window: usize,
    pub buy_below: f64,
    pub sell_above: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            buy_below: DEFAULT_BUY_BELOW,
            sell_above: DEFAULT_SELL_ABOVE,
        }
    }
}

impl SignalParams {
    /// Default thresholds with the given window.
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MeanrevError> {
        if self.window < MIN_WINDOW {
            return Err(MeanrevError::invalid_parameter(
                "window",
                format!("must be at least {MIN_WINDOW}, got {}", self.window),
            ));
        }
        if !self.buy_below.is_finite() {
            return Err(MeanrevError::invalid_parameter(
                "buy_below",
                format!("must be finite, got {}", self.buy_below),
            ));
        }
        if !self.sell_above.is_finite() {
            return Err(MeanrevError::invalid_parameter(
                "sell_above",
                format!("must be finite, got {}", self.sell_above),
            ));
        }
        Ok(())
    }
}

/// Derived statistics and signals for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub close_price: f64,
    pub moving_average: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub buy_signal: bool,
    pub sell_signal: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Streaming form of the computation: feed observations in date order.
#[derive(Debug, Clone)]
pub struct SignalCalculator {
    params: SignalParams,
    window: RollingWindow,
}

impl SignalCalculator {
    pub fn new(params: SignalParams) -> Result<Self, MeanrevError> {
        params.validate()?;
        Ok(Self {
            window: RollingWindow::new(params.window)?,
            params,
        })
    }

    /// Push the next observation; returns a record if its window yields finite statistics.
    pub fn update(&mut self, obs: &PriceObservation) -> Option<SignalRecord> {
        self.window.push(obs.close_price);
        if !self.window.is_full() {
            return None;
        }

        let moving_average = self.window.mean();
        let std_dev = self.window.sample_std_dev();
        if std_dev == 0.0 {
            return None;
        }
        let z_score = (obs.close_price - moving_average) / std_dev;
        if !(moving_average.is_finite() && std_dev.is_finite() && z_score.is_finite()) {
            return None;
        }

        // thresholds are checked independently so overlapping bands stay representable
        let buy_signal = z_score < self.params.buy_below;
        let sell_signal = z_score > self.params.sell_above;

        let extra = obs
            .extra
            .iter()
            .filter(|(k, _)| !RECORD_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(SignalRecord {
            date: obs.date,
            close_price: obs.close_price,
            moving_average,
            std_dev,
            z_score,
            buy_signal,
            sell_signal,
            extra,
        })
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Compute signals with the default ±1 z-score thresholds.
pub fn compute_signals(
    series: &[PriceObservation],
    window: usize,
) -> Result<Vec<SignalRecord>, MeanrevError> {
    compute_signals_with(series, &SignalParams::with_window(window))
}

pub fn compute_signals_with(
    series: &[PriceObservation],
    params: &SignalParams,
) -> Result<Vec<SignalRecord>, MeanrevError> {
    let mut calculator = SignalCalculator::new(*params)?;
    let mut records = Vec::with_capacity(series.len().saturating_sub(params.window - 1));
    for obs in series {
        if let Some(record) = calculator.update(obs) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Counts over a computed record set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSummary {
    pub records: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub latest: Option<NaiveDate>,
}

impl SignalSummary {
    pub fn from_records(records: &[SignalRecord]) -> Self {
        Self {
            records: records.len(),
            buy_signals: records.iter().filter(|r| r.buy_signal).count(),
            sell_signals: records.iter().filter(|r| r.sell_signal).count(),
            latest: records.last().map(|r| r.date),
        }
    }
}
