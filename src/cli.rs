//! CLI definition and dispatch.
//!
//! stdout carries JSON only; diagnostics go to stderr through `tracing`, and
//! fatal errors are printed to stderr before the process exits non-zero.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::symbol_map_adapter::HashMapSymbolMap;
use crate::domain::error::MeanrevError;
use crate::domain::observation::parse_observations;
use crate::domain::signal::{
    DEFAULT_BUY_BELOW, DEFAULT_SELL_ABOVE, DEFAULT_WINDOW, SignalParams, SignalSummary,
    compute_signals_with,
};
use crate::domain::symbols::parse_symbols;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::symbol_map_port::SymbolMapPort;

const EARLIEST: (i32, u32, u32) = (1900, 1, 1);
const LATEST: (i32, u32, u32) = (9999, 12, 31);

#[derive(Parser, Debug)]
#[command(name = "meanrev", about = "Mean-reversion signals over daily closing prices")]
pub struct Cli {
    /// Log verbosity on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Window and threshold overrides shared by the computing commands.
#[derive(Args, Debug, Default, Clone)]
pub struct ParamArgs {
    /// Trailing window length (>= 2)
    #[arg(short, long)]
    pub window: Option<usize>,
    /// Buy when the z-score is below this value
    #[arg(long, allow_negative_numbers = true)]
    pub buy_below: Option<f64>,
    /// Sell when the z-score is above this value
    #[arg(long, allow_negative_numbers = true)]
    pub sell_above: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute signals from a JSON array of observations
    Signals {
        /// Instrument identifier (informational)
        ticker: String,
        /// Start of the requested range (informational)
        start_date: String,
        /// End of the requested range (informational)
        end_date: String,
        /// JSON array of observations; omit or pass "-" to read stdin
        data: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compute signals for symbols in the configured price store
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols; defaults to every stored symbol
        #[arg(long)]
        symbols: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Load a combined price CSV into the SQLite store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        csv: PathBuf,
        /// Only import these symbols, looked up through the symbol map
        #[arg(long)]
        symbols: Option<String>,
        /// CSV code of the benchmark index series (e.g. ^GSPC), stored in market_index_daily
        #[arg(long)]
        market_index: Option<String>,
    },
    /// List symbols in the configured price store
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored date range per symbol
    Info {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Signals {
            ticker,
            start_date,
            end_date,
            data,
            params,
            config,
        } => run_signals(
            &ticker,
            &start_date,
            &end_date,
            data.as_deref(),
            &params,
            config.as_deref(),
        ),
        Command::Analyze {
            config,
            symbols,
            start,
            end,
            params,
        } => run_analyze(
            &config,
            symbols.as_deref(),
            start.as_deref(),
            end.as_deref(),
            &params,
        ),
        Command::Import {
            config,
            csv,
            symbols,
            market_index,
        } => run_import(&config, &csv, symbols.as_deref(), market_index.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { symbol, config } => run_info(symbol.as_deref(), &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, MeanrevError> {
    tracing::info!("loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// CLI flag, then `[signals]` config key, then the built-in default.
pub fn resolve_params(
    args: &ParamArgs,
    config: &dyn ConfigPort,
) -> Result<SignalParams, MeanrevError> {
    let window = match args.window {
        Some(w) => w,
        None => {
            let raw = config.get_int("signals", "window", DEFAULT_WINDOW as i64);
            usize::try_from(raw).map_err(|_| MeanrevError::ConfigInvalid {
                section: "signals".into(),
                key: "window".into(),
                reason: format!("must be a positive integer, got {raw}"),
            })?
        }
    };

    let params = SignalParams {
        window,
        buy_below: args
            .buy_below
            .unwrap_or_else(|| config.get_double("signals", "buy_below", DEFAULT_BUY_BELOW)),
        sell_above: args
            .sell_above
            .unwrap_or_else(|| config.get_double("signals", "sell_above", DEFAULT_SELL_ABOVE)),
    };
    params.validate()?;
    Ok(params)
}

/// The `data` argument, or all of `stdin` when it is absent or "-".
pub fn read_input(data: Option<&str>, mut stdin: impl Read) -> Result<String, MeanrevError> {
    match data {
        Some(d) if d != "-" => Ok(d.to_string()),
        _ => {
            let mut buf = String::new();
            stdin.read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode observations, compute, and encode the records as a JSON array.
pub fn signals_json(data: &str, params: &SignalParams) -> Result<String, MeanrevError> {
    let observations = parse_observations(data)?;
    let records = compute_signals_with(&observations, params)?;
    Ok(serde_json::to_string(&records)?)
}

fn run_signals(
    ticker: &str,
    start_date: &str,
    end_date: &str,
    data: Option<&str>,
    args: &ParamArgs,
    config_path: Option<&Path>,
) -> Result<(), MeanrevError> {
    let config = match config_path {
        Some(p) => load_config(p)?,
        None => FileConfigAdapter::empty(),
    };
    let params = resolve_params(args, &config)?;
    let input = read_input(data, io::stdin().lock())?;

    tracing::info!(
        ticker,
        start_date,
        end_date,
        window = params.window,
        "computing mean-reversion signals"
    );
    let json = signals_json(&input, &params)?;

    let mut out = io::stdout().lock();
    writeln!(out, "{json}")?;
    Ok(())
}

pub fn parse_date_arg(
    value: Option<&str>,
    config: &dyn ConfigPort,
    key: &str,
    fallback: (i32, u32, u32),
) -> Result<NaiveDate, MeanrevError> {
    let raw = value
        .map(str::to_string)
        .or_else(|| config.get_string("data", key));
    match raw {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            MeanrevError::ConfigInvalid {
                section: "data".into(),
                key: key.into(),
                reason: "invalid date format (expected YYYY-MM-DD)".into(),
            }
        }),
        None => {
            let (y, m, d) = fallback;
            NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| MeanrevError::ConfigInvalid {
                section: "data".into(),
                key: key.into(),
                reason: "out-of-range default date".into(),
            })
        }
    }
}

/// Price store selected by `[data] source` (sqlite, csv or postgres).
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, MeanrevError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "sqlite".to_string())
        .to_lowercase();

    match source.as_str() {
        "csv" => {
            let path = config.require_string("csv", "path")?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(path))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter))
        }
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Box::new(
            crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?,
        )),
        other => Err(MeanrevError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unsupported source {other:?} for this build"),
        }),
    }
}

/// `[symbols] map_file` if configured, otherwise an empty mapping.
pub fn load_symbol_map(config: &dyn ConfigPort) -> Result<HashMapSymbolMap, MeanrevError> {
    match config
        .get_string("symbols", "map_file")
        .filter(|s| !s.trim().is_empty())
    {
        Some(path) => {
            let map = HashMapSymbolMap::from_csv_file(&path)?;
            tracing::info!(entries = map.len(), "loaded symbol map from {path}");
            Ok(map)
        }
        None => Ok(HashMapSymbolMap::new()),
    }
}

/// Compute signals for each symbol, keyed by the symbol as requested.
///
/// Each symbol is fetched under its canonical name. Symbols that fail to fetch
/// or have no rows in range are skipped with a warning.
pub fn analyze_symbols(
    data_port: &dyn DataPort,
    symbol_map: &dyn SymbolMapPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    params: &SignalParams,
) -> Result<Map<String, Value>, MeanrevError> {
    params.validate()?;
    let mut results = Map::new();

    for symbol in symbols {
        let canonical = symbol_map.canonical(symbol);
        if canonical != *symbol {
            tracing::debug!(%symbol, %canonical, "remapped symbol");
        }

        let observations = match data_port.fetch_prices(&canonical, start_date, end_date) {
            Ok(obs) if obs.is_empty() => {
                tracing::warn!(%symbol, "skipping: no data in range");
                continue;
            }
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "skipping: fetch failed");
                continue;
            }
        };

        let records = compute_signals_with(&observations, params)?;
        let summary = SignalSummary::from_records(&records);
        tracing::info!(
            %symbol,
            observations = observations.len(),
            records = summary.records,
            buys = summary.buy_signals,
            sells = summary.sell_signals,
            latest = ?summary.latest,
            "computed signals"
        );
        results.insert(symbol.clone(), serde_json::to_value(&records)?);
    }

    if results.is_empty() {
        return Err(MeanrevError::NoData {
            symbol: symbols.join(","),
        });
    }
    Ok(results)
}

fn resolve_symbols(
    symbols: Option<&str>,
    data_port: &dyn DataPort,
) -> Result<Vec<String>, MeanrevError> {
    match symbols {
        Some(s) => Ok(parse_symbols(s)?),
        None => data_port.list_symbols(),
    }
}

fn run_analyze(
    config_path: &Path,
    symbols: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
    args: &ParamArgs,
) -> Result<(), MeanrevError> {
    let config = load_config(config_path)?;
    let params = resolve_params(args, &config)?;
    let start_date = parse_date_arg(start, &config, "start_date", EARLIEST)?;
    let end_date = parse_date_arg(end, &config, "end_date", LATEST)?;

    let data_port = open_data_port(&config)?;
    let symbol_map = load_symbol_map(&config)?;
    let symbols = resolve_symbols(symbols, data_port.as_ref())?;

    tracing::info!(
        symbols = symbols.len(),
        %start_date,
        %end_date,
        window = params.window,
        "analyzing"
    );
    let results = analyze_symbols(
        data_port.as_ref(),
        &symbol_map,
        &symbols,
        start_date,
        end_date,
        &params,
    )?;

    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string(&results)?)?;
    Ok(())
}

/// Rows written by one import, split by destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub stock_rows: usize,
    pub index_rows: usize,
}

/// Copy CSV rows into the store. Rows whose code equals `market_index` go to
/// the benchmark table; every other selected symbol goes to `stocks_daily`.
#[cfg(feature = "sqlite")]
pub fn import_csv(
    source: &CsvAdapter,
    store: &crate::adapters::sqlite_adapter::SqliteAdapter,
    symbol_map: &dyn SymbolMapPort,
    symbols: Option<&[String]>,
    market_index: Option<&str>,
) -> Result<ImportSummary, MeanrevError> {
    let market_index = market_index.map(|s| s.trim().to_uppercase());
    let is_index = |code: &str| market_index.as_deref() == Some(code);
    let mut summary = ImportSummary::default();

    match symbols {
        Some(symbols) => {
            for symbol in symbols.iter().filter(|s| !is_index(s.as_str())) {
                let canonical = symbol_map.canonical(symbol);
                let observations = source.fetch_all(&canonical)?;
                if observations.is_empty() {
                    tracing::warn!(%symbol, %canonical, "no rows in csv");
                    continue;
                }
                summary.stock_rows += store.insert_observations(symbol, &observations)?;
            }
            if let Some(index) = market_index.as_deref() {
                let observations = source.fetch_all(index)?;
                summary.index_rows += store.insert_market_index(&observations)?;
            }
        }
        None => {
            let mut by_symbol: std::collections::BTreeMap<String, Vec<_>> = Default::default();
            let mut index_rows = Vec::new();
            for (code, obs) in source.load_all()? {
                if is_index(code.as_str()) {
                    index_rows.push(obs);
                } else {
                    by_symbol.entry(code).or_default().push(obs);
                }
            }
            for (symbol, observations) in by_symbol {
                summary.stock_rows += store.insert_observations(&symbol, &observations)?;
            }
            summary.index_rows += store.insert_market_index(&index_rows)?;
        }
    }

    if let Some(index) = market_index.as_deref() {
        if summary.index_rows == 0 {
            tracing::warn!(%index, "no market index rows in csv");
        }
    }
    Ok(summary)
}

fn run_import(
    config_path: &Path,
    csv_path: &Path,
    symbols: Option<&str>,
    market_index: Option<&str>,
) -> Result<(), MeanrevError> {
    let config = load_config(config_path)?;

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = SqliteAdapter::from_config(&config)?;
        store.initialize_schema()?;
        let symbol_map = load_symbol_map(&config)?;
        let symbols = symbols.map(parse_symbols).transpose()?;

        let source = CsvAdapter::new(csv_path.to_path_buf());
        let summary = import_csv(
            &source,
            &store,
            &symbol_map,
            symbols.as_deref(),
            market_index,
        )?;
        tracing::info!(
            stock_rows = summary.stock_rows,
            index_rows = summary.index_rows,
            "import complete"
        );
        eprintln!(
            "Imported {} stock rows from {}",
            summary.stock_rows,
            csv_path.display()
        );
        if let Some((min_date, max_date, count)) = store.market_index_range()? {
            eprintln!("Market index: {count} rows, {min_date} to {max_date}");
        }
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, csv_path, symbols, market_index);
        Err(MeanrevError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "sqlite feature is required for import".into(),
        })
    }
}

fn run_list_symbols(config_path: &Path) -> Result<(), MeanrevError> {
    let config = load_config(config_path)?;
    let data_port = open_data_port(&config)?;
    let symbols = data_port.list_symbols()?;

    if symbols.is_empty() {
        eprintln!("No symbols found");
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for symbol in &symbols {
        writeln!(out, "{symbol}")?;
    }
    eprintln!("{} symbols found", symbols.len());
    Ok(())
}

fn run_info(symbol: Option<&str>, config_path: &Path) -> Result<(), MeanrevError> {
    let config = load_config(config_path)?;
    let data_port = open_data_port(&config)?;
    let symbols = resolve_symbols(symbol, data_port.as_ref())?;

    write_data_ranges(data_port.as_ref(), &symbols, &mut io::stdout().lock())
}

/// One line per stored symbol. Every symbol is reported; the first query
/// failure is returned once all have been tried.
pub fn write_data_ranges(
    data_port: &dyn DataPort,
    symbols: &[String],
    out: &mut impl Write,
) -> Result<(), MeanrevError> {
    let mut first_error = None;
    for s in symbols {
        match data_port.get_data_range(s) {
            Ok(Some((min_date, max_date, count))) => {
                writeln!(out, "{s}: {count} rows, {min_date} to {max_date}")?;
            }
            Ok(None) => eprintln!("{s}: no data found"),
            Err(e) => {
                eprintln!("error querying {s}: {e}");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_signals_with_negative_threshold() {
        let cli = Cli::try_parse_from([
            "meanrev",
            "signals",
            "AAPL",
            "2024-01-01",
            "2024-07-01",
            "[]",
            "--window",
            "20",
            "--buy-below",
            "-1.5",
        ])
        .unwrap();
        match cli.command {
            Command::Signals { ticker, data, params, .. } => {
                assert_eq!(ticker, "AAPL");
                assert_eq!(data.as_deref(), Some("[]"));
                assert_eq!(params.window, Some(20));
                assert_eq!(params.buy_below, Some(-1.5));
                assert_eq!(params.sell_above, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_counts_verbosity() {
        let cli = Cli::try_parse_from(["meanrev", "-vv", "list-symbols", "-c", "x.ini"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn read_input_prefers_argument() {
        let input = read_input(Some("[1]"), io::empty()).unwrap();
        assert_eq!(input, "[1]");
    }

    #[test]
    fn read_input_dash_reads_stdin() {
        let input = read_input(Some("-"), "[2]".as_bytes()).unwrap();
        assert_eq!(input, "[2]");
        let input = read_input(None, "[3]".as_bytes()).unwrap();
        assert_eq!(input, "[3]");
    }

    #[test]
    fn unknown_source_is_config_invalid() {
        let config = FileConfigAdapter::from_string("[data]\nsource = mongodb\n").unwrap();
        assert!(matches!(
            open_data_port(&config),
            Err(MeanrevError::ConfigInvalid { key, .. }) if key == "source"
        ));
    }

    #[test]
    fn csv_source_requires_path() {
        let config = FileConfigAdapter::from_string("[data]\nsource = csv\n").unwrap();
        assert!(matches!(
            open_data_port(&config),
            Err(MeanrevError::ConfigMissing { section, .. }) if section == "csv"
        ));
    }

    #[test]
    fn date_arg_falls_back_to_config_then_default() {
        let config = FileConfigAdapter::from_string("[data]\nstart_date = 2018-02-08\n").unwrap();
        assert_eq!(
            parse_date_arg(None, &config, "start_date", EARLIEST).unwrap(),
            NaiveDate::from_ymd_opt(2018, 2, 8).unwrap()
        );
        assert_eq!(
            parse_date_arg(Some("2020-05-01"), &config, "start_date", EARLIEST).unwrap(),
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
        );
        assert_eq!(
            parse_date_arg(None, &config, "end_date", LATEST).unwrap(),
            NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()
        );
        assert!(parse_date_arg(Some("2020/05/01"), &config, "start_date", EARLIEST).is_err());
    }
}
