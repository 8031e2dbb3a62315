//! Fixed-size trailing window over a price series.
//!
//! Mean and sample standard deviation are recomputed from the buffered values
//! on every query, so a non-finite value only affects the windows containing it.
//! Both stay finite for any finite inputs whose spread is representable.

use std::collections::VecDeque;

use crate::domain::error::MeanrevError;

pub const MIN_WINDOW: usize = 2;

// larger windows grow on demand
const PREALLOCATE_LIMIT: usize = 256;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Result<Self, MeanrevError> {
        if capacity < MIN_WINDOW {
            return Err(MeanrevError::invalid_parameter(
                "window",
                format!("must be at least {MIN_WINDOW}, got {capacity}"),
            ));
        }
        Ok(Self {
            capacity,
            values: VecDeque::with_capacity(capacity.min(PREALLOCATE_LIMIT)),
        })
    }

    /// Append a value, evicting the oldest once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Arithmetic mean of the buffered values. NaN when empty.
    pub fn mean(&self) -> f64 {
        let Some(&shift) = self.values.front() else {
            return f64::NAN;
        };
        let n = self.values.len() as f64;
        // offsets from the first value keep large closes from overflowing the sum
        let mean = shift + self.values.iter().map(|v| v - shift).sum::<f64>() / n;
        if mean.is_finite() || !self.values.iter().all(|v| v.is_finite()) {
            return mean;
        }
        self.values.iter().map(|v| v / n).sum()
    }

    /// Sample standard deviation (N-1 denominator). NaN with fewer than two values.
    pub fn sample_std_dev(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return f64::NAN;
        }
        // identical values must give exactly zero; the rounded mean may not equal them
        let first = self.values[0];
        if self.values.iter().all(|&v| v == first) {
            return 0.0;
        }
        let mean = self.mean();
        if !mean.is_finite() {
            return f64::NAN;
        }
        // deviations are scaled by the largest one so squaring cannot overflow
        let scale = self
            .values
            .iter()
            .map(|v| (v - mean).abs())
            .fold(0.0, f64::max);
        if scale == 0.0 {
            return 0.0;
        }
        let sum_sq: f64 = self
            .values
            .iter()
            .map(|v| {
                let diff = (v - mean) / scale;
                diff * diff
            })
            .sum();
        scale * (sum_sq / (n - 1) as f64).sqrt()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
