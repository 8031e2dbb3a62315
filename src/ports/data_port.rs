//! Price data access port trait.

use crate::domain::error::MeanrevError;
use crate::domain::observation::PriceObservation;
use chrono::NaiveDate;

pub trait DataPort {
    /// Observations for `symbol` within `[start_date, end_date]`, ascending by date.
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, MeanrevError>;

    fn list_symbols(&self) -> Result<Vec<String>, MeanrevError>;

    /// First date, last date and row count stored for `symbol`.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, MeanrevError>;
}
