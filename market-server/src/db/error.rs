use thiserror::Error;

use std::time::Duration;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("ConnectionError - InvalidEndpoint: {0} must not be empty")]
    InvalidEndpoint(&'static str),
    #[error("ConnectionError - Unreachable {host}/{database}: {source}")]
    Unreachable {
        host: String,
        database: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreOperationError {
    #[error("StoreOperationError - Sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("StoreOperationError - DeadlineExceeded: no result within {0:?}")]
    DeadlineExceeded(Duration),
}
