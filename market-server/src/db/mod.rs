mod batch;
mod config;
mod connection;
mod error;

use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use std::{future::Future, time::Duration};

use crate::{market_price::MarketPrices, official_coin_rate::OfficialCoinRates};

pub(crate) use batch::execute_batched;
pub use config::*;
pub use connection::*;
pub use error::*;

/// The pools the repositories route to.
#[derive(Debug, Clone)]
pub enum DataSource {
    Primary(PgPool),
    PrimaryWithReplica { primary: PgPool, replica: PgPool },
}

impl DataSource {
    /// Every insert, update and upsert goes through here.
    pub fn write_pool(&self) -> &PgPool {
        match self {
            DataSource::Primary(primary) => primary,
            DataSource::PrimaryWithReplica { primary, .. } => primary,
        }
    }

    pub fn read_pool(&self) -> &PgPool {
        match self {
            DataSource::Primary(primary) => primary,
            DataSource::PrimaryWithReplica { replica, .. } => replica,
        }
    }

    async fn close(&self) {
        match self {
            DataSource::Primary(primary) => primary.close().await,
            DataSource::PrimaryWithReplica { primary, replica } => {
                replica.close().await;
                primary.close().await;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ReplicaStatus {
    NotConfigured,
    Connected,
    /// A replica was configured but could not be reached at startup, reads
    /// are served by the primary.
    Unavailable(String),
}

/// Owns the primary pool and the optional replica pool and hands out
/// repositories bound to them.
#[derive(Debug, Clone)]
pub struct Database {
    source: DataSource,
    replica_status: ReplicaStatus,
    tuning: StoreTuning,
}

impl Database {
    #[instrument(name = "database.connect", skip_all, fields(primary = %config.primary.host))]
    pub async fn connect(config: DatabaseConfig) -> Result<Self, ConnectionError> {
        let DatabaseConfig {
            primary,
            replica,
            tuning,
        } = config;
        let primary = connection::connect(&primary, &tuning).await?;

        let (source, replica_status) = match replica.filter(DatabaseEndpoint::is_configured) {
            None => {
                tracing::info!("no replica configured, routing reads to primary");
                (DataSource::Primary(primary), ReplicaStatus::NotConfigured)
            }
            Some(endpoint) => match connection::connect(&endpoint, &tuning).await {
                Ok(replica) => (
                    DataSource::PrimaryWithReplica { primary, replica },
                    ReplicaStatus::Connected,
                ),
                Err(e) => {
                    tracing::warn!(
                        replica = %endpoint.host,
                        error = %e,
                        "replica unavailable, running degraded with reads on primary"
                    );
                    (
                        DataSource::Primary(primary),
                        ReplicaStatus::Unavailable(e.to_string()),
                    )
                }
            },
        };

        Ok(Self {
            source,
            replica_status,
            tuning,
        })
    }

    pub fn new(source: DataSource, tuning: StoreTuning) -> Self {
        let replica_status = match source {
            DataSource::Primary(_) => ReplicaStatus::NotConfigured,
            DataSource::PrimaryWithReplica { .. } => ReplicaStatus::Connected,
        };
        Self {
            source,
            replica_status,
            tuning,
        }
    }

    pub fn market_prices(&self) -> MarketPrices {
        MarketPrices::new(&self.source, &self.tuning)
    }

    pub fn official_coin_rates(&self) -> OfficialCoinRates {
        OfficialCoinRates::new(&self.source, &self.tuning)
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn replica_status(&self) -> &ReplicaStatus {
        &self.replica_status
    }

    /// Closes both pools. Calling it again is a no-op.
    pub async fn close(&self) {
        self.source.close().await
    }
}

/// Bounds a store operation by `deadline`. On expiry the operation's future
/// is dropped, which aborts the round-trip to the store.
pub async fn within<T, F>(deadline: Duration, operation: F) -> Result<T, StoreOperationError>
where
    F: Future<Output = Result<T, StoreOperationError>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| StoreOperationError::DeadlineExceeded(deadline))?
}
