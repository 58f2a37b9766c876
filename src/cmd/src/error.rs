use std::result;

use common::error::CommonError;
use query::error::QueryError;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("BadRequest: {0:?}")]
    BadRequest(String),
    #[error("Query: {0:?}")]
    Query(#[from] QueryError),
    #[error("Common: {0:?}")]
    Common(#[from] CommonError),
    #[error("Config: {0:?}")]
    Config(#[from] ::config::ConfigError),
    #[error("Csv: {0:?}")]
    Csv(#[from] csv::Error),
    #[error("Serde: {0:?}")]
    Serde(#[from] serde_json::Error),
    #[error("StdIO: {0:?}")]
    StdIO(#[from] std::io::Error),
    #[error("ParseDuration: {0:?}")]
    ParseDuration(#[from] parse_duration::parse::Error),
    #[error("SetGlobalDefaultError: {0:?}")]
    SetGlobalDefaultError(#[from] SetGlobalDefaultError),
    #[error("other: {0:?}")]
    Other(#[from] anyhow::Error),
}
