use thiserror::Error;

/// Failures of the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record or profile store could not be queried. No partial result accompanies it.
    #[error("record store unavailable: {0}")]
    DataUnavailable(String),
    #[error("malformed date: {0:?} (expected YYYY-MM-DD)")]
    MalformedDate(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::DataUnavailable(e.to_string())
    }
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DataUnavailable(_) => "data_unavailable",
            EngineError::MalformedDate(_) => "bad_params",
        }
    }
}
