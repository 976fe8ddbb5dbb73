//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for stockscan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no data for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid aggregation mode '{0}' (expected best or sum)")]
    InvalidAggregation(String),

    #[error("invalid constraint mode '{0}' (expected strict or advisory)")]
    InvalidConstraintMode(String),

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error("universe unreachable: all {attempted} tickers failed to fetch")]
    UniverseUnreachable { attempted: usize },

    #[error("failed to write {sink}: {reason}")]
    SinkWrite { sink: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn data_unavailable(ticker: &str, reason: impl ToString) -> Self {
        ScanError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn sink(sink: &str, reason: impl ToString) -> Self {
        ScanError::SinkWrite {
            sink: sink.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::ConfigParse { .. }
                | ScanError::ConfigInvalid { .. }
                | ScanError::UnknownStrategy(_)
                | ScanError::InvalidAggregation(_)
                | ScanError::InvalidConstraintMode(_)
        )
    }
}

impl From<&ScanError> for std::process::ExitCode {
    fn from(err: &ScanError) -> Self {
        let code: u8 = match err {
            ScanError::Io(_) | ScanError::SinkWrite { .. } => 1,
            e if e.is_configuration() => 2,
            _ => 3,
        };
        std::process::ExitCode::from(code)
    }
}
