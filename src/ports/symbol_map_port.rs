//! Ticker remapping port.
//!
//! Delisted or renamed tickers are looked up under a replacement symbol. The
//! mapping is data, so it is injected rather than compiled in.

pub trait SymbolMapPort {
    /// The symbol to query for `symbol`; unmapped symbols map to themselves.
    fn canonical(&self, symbol: &str) -> String;
}
