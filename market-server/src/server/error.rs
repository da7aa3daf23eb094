use thiserror::Error;

use super::LifecycleState;

#[derive(Error, Debug)]
pub enum MarketServerError {
    #[error("MarketServerError - Bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("MarketServerError - InvalidState: cannot start while {0:?}")]
    InvalidState(LifecycleState),
    #[error("MarketServerError - InvalidConfig: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("ConvertError - InvalidDecimal '{0}': {1}")]
    InvalidDecimal(String, rust_decimal::Error),
    #[error("ConvertError - InvalidTimestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("ConvertError - MissingField: {0}")]
    MissingField(String),
}
