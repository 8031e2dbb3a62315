//! Ticker remapping tables.
//!
//! The file form is a two-column CSV:
//!
//! ```text
//! symbol,canonical
//! ABC,CHRW
//! BRK.B,CB
//! ```

use crate::domain::error::MeanrevError;
use crate::ports::symbol_map_port::SymbolMapPort;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct HashMapSymbolMap {
    map: HashMap<String, String>,
}

impl HashMapSymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, canonical: &str) -> Self {
        self.insert(symbol, canonical);
        self
    }

    pub fn insert(&mut self, symbol: &str, canonical: &str) {
        self.map
            .insert(symbol.trim().to_uppercase(), canonical.trim().to_uppercase());
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self, MeanrevError> {
        let path = path.as_ref();
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| MeanrevError::ConfigParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_reader(rdr).map_err(|reason| MeanrevError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })
    }

    pub fn from_csv_str(content: &str) -> Result<Self, MeanrevError> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        Self::from_reader(rdr).map_err(|reason| MeanrevError::ConfigParse {
            file: "<string>".into(),
            reason,
        })
    }

    fn from_reader<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Self, String> {
        #[derive(Deserialize)]
        struct Row {
            symbol: String,
            canonical: String,
        }

        let mut map = Self::new();
        for result in rdr.deserialize::<Row>() {
            let row = result.map_err(|e| e.to_string())?;
            if row.symbol.is_empty() || row.canonical.is_empty() {
                return Err(format!("empty mapping for {:?}", row.symbol));
            }
            map.insert(&row.symbol, &row.canonical);
        }
        Ok(map)
    }
}

impl SymbolMapPort for HashMapSymbolMap {
    fn canonical(&self, symbol: &str) -> String {
        let key = symbol.trim().to_uppercase();
        self.map.get(&key).cloned().unwrap_or(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn unmapped_symbols_map_to_themselves() {
        let map = HashMapSymbolMap::new();
        assert_eq!(map.canonical("aapl"), "AAPL");
    }

    #[test]
    fn mapped_symbols_are_replaced() {
        let map = HashMapSymbolMap::new().with("ABC", "CHRW").with("brk.b", "cb");
        assert_eq!(map.canonical("ABC"), "CHRW");
        assert_eq!(map.canonical("BRK.B"), "CB");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn parses_csv_with_blank_lines() {
        let map =
            HashMapSymbolMap::from_csv_str("symbol,canonical\nFB, AWK\n\nTWX,MSFT\n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.canonical("fb"), "AWK");
        assert_eq!(map.canonical("TWX"), "MSFT");
    }

    #[test]
    fn rejects_empty_canonical() {
        let err = HashMapSymbolMap::from_csv_str("symbol,canonical\nFB,\n").unwrap_err();
        assert!(matches!(err, MeanrevError::ConfigParse { .. }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "symbol,canonical\nCELG,CHD\n").unwrap();
        let map = HashMapSymbolMap::from_csv_file(file.path()).unwrap();
        assert_eq!(map.canonical("CELG"), "CHD");
    }

    #[test]
    fn missing_file_is_config_error() {
        assert!(HashMapSymbolMap::from_csv_file("/nonexistent/ticker_map.csv").is_err());
    }
}
