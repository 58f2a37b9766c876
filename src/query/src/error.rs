use std::result;

use common::error::CommonError;
use thiserror::Error;

pub type Result<T> = result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("internal {0:?}")]
    Internal(String),
    #[error("invalid step definition {0:?}")]
    InvalidStepDefinition(String),
    #[error("invalid window {0:?}")]
    InvalidWindow(String),
    #[error("invalid filter {0:?}")]
    InvalidFilter(String),
    #[error("common {0:?}")]
    Common(#[from] CommonError),
    #[error("anyhow {0:?}")]
    Other(#[from] anyhow::Error),
}
