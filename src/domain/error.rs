//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rstrader.
#[derive(Debug, thiserror::Error)]
pub enum RsTraderError {
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

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("insufficient history for {asset}: have {bars} bars, need {minimum}")]
    InsufficientHistory {
        asset: String,
        bars: usize,
        minimum: usize,
    },

    #[error("no price bar for {asset} on {date}")]
    MissingPriceForCycle { asset: String, date: NaiveDate },

    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    #[error("data integrity error: {reason}")]
    DataIntegrity { reason: String },

    #[error("notification failed: {reason}")]
    Notification { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RsTraderError {
    /// Per-asset conditions that exclude the asset from one cycle without
    /// aborting the run.
    pub fn is_asset_skip(&self) -> bool {
        matches!(
            self,
            RsTraderError::NoData { .. }
                | RsTraderError::InsufficientHistory { .. }
                | RsTraderError::MissingPriceForCycle { .. }
        )
    }
}

impl From<&RsTraderError> for std::process::ExitCode {
    fn from(err: &RsTraderError) -> Self {
        let code: u8 = match err {
            RsTraderError::Io(_) => 1,
            RsTraderError::ConfigParse { .. }
            | RsTraderError::ConfigMissing { .. }
            | RsTraderError::ConfigInvalid { .. } => 2,
            RsTraderError::Database { .. }
            | RsTraderError::DatabaseQuery { .. }
            | RsTraderError::PersistenceFailure { .. }
            | RsTraderError::DataIntegrity { .. } => 3,
            RsTraderError::NoData { .. }
            | RsTraderError::InsufficientHistory { .. }
            | RsTraderError::MissingPriceForCycle { .. } => 5,
            RsTraderError::Notification { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
