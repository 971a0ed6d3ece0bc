use context_protocol::SearchMode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnError>;

#[derive(Error, Debug)]
pub enum AnnError {
    #[error("Preflight error: {0}")]
    Preflight(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Unknown ANN provider: {0}")]
    UnknownProvider(String),

    #[error("No usable ANN backend for mode {mode} (tried: {tried})")]
    NoUsableBackend { mode: SearchMode, tried: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl AnnError {
    pub fn preflight(msg: impl Into<String>) -> Self {
        Self::Preflight(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }
}
