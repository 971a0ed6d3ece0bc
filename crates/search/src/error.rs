use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("ANN error: {0}")]
    Ann(#[from] context_ann::AnnError),

    #[error("Query aborted after {admitted} candidates")]
    Aborted { admitted: usize },

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("{0}")]
    Other(String),
}
