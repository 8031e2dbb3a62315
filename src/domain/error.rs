//! Domain error types.

use crate::domain::symbols::SymbolListError;

/// Top-level error type for meanrev.
#[derive(Debug, thiserror::Error)]
pub enum MeanrevError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("failed to decode price observations: {reason}")]
    InputDecode { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    SymbolList(#[from] SymbolListError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MeanrevError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        MeanrevError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MeanrevError {
    fn from(err: serde_json::Error) -> Self {
        MeanrevError::InputDecode {
            reason: err.to_string(),
        }
    }
}

impl From<&MeanrevError> for std::process::ExitCode {
    fn from(err: &MeanrevError) -> Self {
        let code: u8 = match err {
            MeanrevError::Io(_) => 1,
            MeanrevError::ConfigParse { .. }
            | MeanrevError::ConfigMissing { .. }
            | MeanrevError::ConfigInvalid { .. }
            | MeanrevError::InvalidParameter { .. }
            | MeanrevError::SymbolList(_) => 2,
            MeanrevError::Database { .. } | MeanrevError::DatabaseQuery { .. } => 3,
            MeanrevError::NoData { .. } => 5,
            MeanrevError::InputDecode { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
