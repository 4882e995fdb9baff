use connectors::error::AdapterError;
use planner::error::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read input file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("Invalid dialect provided: {0}")]
    InvalidDialect(String),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("Failed to connect: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Not a mutation description")]
    NotAMutation,
}
