//! Per-day price observation for one instrument.
//!
//! Only `date` and `close_price` take part in signal computation. Every other
//! field (open, high, low, volume, vendor extras) lives in `extra` and is
//! written back out untouched alongside the derived values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    #[serde(deserialize_with = "iso_date")]
    pub date: NaiveDate,
    #[serde(
        alias = "close",
        default = "missing_price",
        deserialize_with = "nullable_price"
    )]
    pub close_price: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, close_price: f64) -> Self {
        Self {
            date,
            close_price,
            extra: Map::new(),
        }
    }

    /// Attach a passthrough field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Decode a JSON array of observations.
pub fn parse_observations(json: &str) -> Result<Vec<PriceObservation>, serde_json::Error> {
    serde_json::from_str(json)
}

fn missing_price() -> f64 {
    f64::NAN
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Number(f64),
    Text(String),
    Null(()),
}

// Database drivers hand decimals over as strings; null means the vendor had no close.
fn nullable_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawPrice::deserialize(deserializer)? {
        RawPrice::Number(v) => Ok(v),
        RawPrice::Null(()) => Ok(f64::NAN),
        RawPrice::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid close price {s:?}: {e}"))),
    }
}

fn iso_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_iso_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 date: {raw:?}")))
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn decodes_close_price_field() {
        let obs = parse_observations(r#"[{"date": "2024-07-10", "close_price": 101.5}]"#).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].date, date(2024, 7, 10));
        assert_eq!(obs[0].close_price, 101.5);
        assert!(obs[0].extra.is_empty());
    }

    #[test]
    fn decodes_close_alias() {
        let obs = parse_observations(r#"[{"date": "2024-07-10", "close": 99.0}]"#).unwrap();
        assert_eq!(obs[0].close_price, 99.0);
    }

    #[test]
    fn keeps_unrecognized_fields() {
        let obs = parse_observations(
            r#"[{"date": "2024-07-10", "close": 99.0, "open": 98.5, "volume": 1200, "stock_symbol": "AAPL"}]"#,
        )
        .unwrap();
        assert_eq!(obs[0].extra.get("open"), Some(&json!(98.5)));
        assert_eq!(obs[0].extra.get("volume"), Some(&json!(1200)));
        assert_eq!(obs[0].extra.get("stock_symbol"), Some(&json!("AAPL")));
    }

    #[test]
    fn null_close_becomes_nan() {
        let obs = parse_observations(r#"[{"date": "2024-07-10", "close_price": null}]"#).unwrap();
        assert!(obs[0].close_price.is_nan());
    }

    #[test]
    fn absent_close_becomes_nan() {
        let obs = parse_observations(r#"[{"date": "2024-07-10"}]"#).unwrap();
        assert!(obs[0].close_price.is_nan());
    }

    #[test]
    fn string_close_is_parsed() {
        let obs = parse_observations(r#"[{"date": "2024-07-10", "close_price": "187.25"}]"#).unwrap();
        assert_eq!(obs[0].close_price, 187.25);
    }

    #[test]
    fn garbage_string_close_is_an_error() {
        assert!(parse_observations(r#"[{"date": "2024-07-10", "close_price": "n/a"}]"#).is_err());
    }

    #[test]
    fn timestamp_dates_are_truncated_to_day() {
        let obs = parse_observations(
            r#"[{"date": "2024-07-10T00:00:00.000Z", "close": 1.0},
                {"date": "2024-07-11T16:00:00", "close": 2.0}]"#,
        )
        .unwrap();
        assert_eq!(obs[0].date, date(2024, 7, 10));
        assert_eq!(obs[1].date, date(2024, 7, 11));
    }

    #[test]
    fn bad_date_is_an_error() {
        assert!(parse_observations(r#"[{"date": "10/07/2024", "close": 1.0}]"#).is_err());
    }

    #[test]
    fn empty_array_decodes() {
        assert!(parse_observations("[]").unwrap().is_empty());
    }

    #[test]
    fn serializes_with_passthrough_fields() {
        let obs = PriceObservation::new(date(2024, 1, 2), 10.0).with_field("open", 9.5);
        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(
            value,
            json!({"date": "2024-01-02", "close_price": 10.0, "open": 9.5})
        );
    }
}
