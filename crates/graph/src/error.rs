use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid graph config: {0}")]
    InvalidConfig(String),
}
