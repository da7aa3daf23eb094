use anyhow::bail;
use clap::Args;
use serde::Serialize;

use std::{path::PathBuf, time::Duration};

use market_server::{DatabaseConfig, DatabaseEndpoint, MarketRpcConfig, StoreTuning};

use crate::tracing::TracingConfig;

#[derive(Args, Debug, Clone)]
pub struct MasterDbArgs {
    /// The host of the master database
    #[clap(long, env = "MARKET_MASTER_DB_HOST")]
    pub master_db_host: String,
    /// The port of the master database
    #[clap(long, env = "MARKET_MASTER_DB_PORT")]
    pub master_db_port: u16,
    /// The db name of the master database
    #[clap(long, env = "MARKET_MASTER_DB_NAME")]
    pub master_db_name: String,
    /// The user of the master database
    #[clap(long, env = "MARKET_MASTER_DB_USER")]
    pub master_db_user: String,
    /// The password of the master database
    #[clap(long, env = "MARKET_MASTER_DB_PASSWORD")]
    pub master_db_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SlaveDbArgs {
    /// The host of the slave database
    #[clap(long, env = "MARKET_SLAVE_DB_HOST")]
    pub slave_db_host: Option<String>,
    /// The port of the slave database
    #[clap(long, env = "MARKET_SLAVE_DB_PORT")]
    pub slave_db_port: Option<u16>,
    /// The db name of the slave database
    #[clap(long, env = "MARKET_SLAVE_DB_NAME")]
    pub slave_db_name: Option<String>,
    /// The user of the slave database
    #[clap(long, env = "MARKET_SLAVE_DB_USER")]
    pub slave_db_user: Option<String>,
    /// The password of the slave database
    #[clap(long, env = "MARKET_SLAVE_DB_PASSWORD")]
    pub slave_db_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StoreTuningArgs {
    /// Rows per insert statement
    #[clap(long, env = "MARKET_DB_BATCH_SIZE", default_value_t = 3_000)]
    pub db_batch_size: usize,
    /// Commit every statement on its own unless a transaction is opened explicitly
    #[clap(
        long,
        env = "MARKET_DB_SKIP_DEFAULT_TRANSACTION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub db_skip_default_transaction: bool,
    /// Pool size per database
    #[clap(long, env = "MARKET_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,
    /// Seconds to wait for a database connection
    #[clap(long, env = "MARKET_DB_CONNECT_TIMEOUT", default_value_t = 5)]
    pub db_connect_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path for database migrations
    #[clap(long, env = "MARKET_MIGRATIONS_DIR", default_value = "./migrations")]
    pub migrations: PathBuf,
    /// The host of the rpc
    #[clap(long, env = "MARKET_RPC_HOST")]
    pub rpc_host: String,
    /// The port of the rpc
    #[clap(long, env = "MARKET_RPC_PORT")]
    pub rpc_port: u16,
    /// Max size in bytes of a single rpc message
    #[clap(long, env = "MARKET_RPC_MAX_MESSAGE_SIZE", default_value_t = 64 * 1024 * 1024)]
    pub rpc_max_message_size: usize,
    /// Milliseconds a call may take at most
    #[clap(long, env = "MARKET_RPC_REQUEST_TIMEOUT", default_value_t = 10_000)]
    pub rpc_request_timeout: u64,
    /// Require this value in the x-api-key metadata of every call
    #[clap(long, env = "MARKET_RPC_API_KEY")]
    pub rpc_api_key: Option<String>,
    /// The host of the http
    #[clap(long, env = "MARKET_HTTP_HOST")]
    pub http_host: String,
    /// The port of the http
    #[clap(long, env = "MARKET_HTTP_PORT")]
    pub http_port: u16,
    /// The host of the metric
    #[clap(long = "metric-host", env = "MARKET_METRIC_HOST")]
    pub metrics_host: String,
    /// The port of the metric
    #[clap(long = "metric-port", env = "MARKET_METRIC_PORT")]
    pub metrics_port: u16,
    #[clap(flatten)]
    pub master_db: MasterDbArgs,
    #[clap(flatten)]
    pub slave_db: SlaveDbArgs,
    #[clap(flatten)]
    pub tuning: StoreTuningArgs,
    /// Jaeger agent host
    #[clap(long, env = "MARKET_TRACING_HOST", default_value = "localhost")]
    pub tracing_host: String,
    /// Jaeger agent port
    #[clap(long, env = "MARKET_TRACING_PORT", default_value_t = 6831)]
    pub tracing_port: u16,
    #[clap(long, env = "MARKET_TRACING_SERVICE_NAME", default_value = "market-services")]
    pub tracing_service_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub migrations: PathBuf,
    pub rpc_server: MarketRpcConfig,
    pub rest_server: ServerAddress,
    pub metrics: ServerAddress,
    pub db: DatabaseConfig,
    pub tracing: TracingConfig,
    #[serde(skip)]
    pub rpc_api_key: Option<String>,
}

impl TryFrom<MasterDbArgs> for DatabaseEndpoint {
    type Error = anyhow::Error;

    fn try_from(args: MasterDbArgs) -> anyhow::Result<Self> {
        for (flag, value) in [
            ("master-db-host", &args.master_db_host),
            ("master-db-name", &args.master_db_name),
            ("master-db-user", &args.master_db_user),
        ] {
            if value.is_empty() {
                bail!("--{flag} must not be empty");
            }
        }
        Ok(DatabaseEndpoint {
            host: args.master_db_host,
            port: Some(args.master_db_port),
            name: args.master_db_name,
            user: Some(args.master_db_user),
            password: non_empty(args.master_db_password),
        })
    }
}

impl SlaveDbArgs {
    fn into_endpoint(self) -> Option<DatabaseEndpoint> {
        let endpoint = DatabaseEndpoint {
            host: self.slave_db_host.unwrap_or_default(),
            port: self.slave_db_port,
            name: self.slave_db_name.unwrap_or_default(),
            user: non_empty(self.slave_db_user),
            password: non_empty(self.slave_db_password),
        };
        endpoint.is_configured().then_some(endpoint)
    }
}

impl From<StoreTuningArgs> for StoreTuning {
    fn from(args: StoreTuningArgs) -> Self {
        StoreTuning {
            batch_size: args.db_batch_size,
            skip_default_transaction: args.db_skip_default_transaction,
            max_connections: args.db_max_connections,
            connect_timeout: Duration::from_secs(args.db_connect_timeout),
        }
    }
}

impl TryFrom<RunArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: RunArgs) -> anyhow::Result<Self> {
        for (flag, value) in [
            ("rpc-host", &args.rpc_host),
            ("http-host", &args.http_host),
            ("metric-host", &args.metrics_host),
        ] {
            if value.is_empty() {
                bail!("--{flag} must not be empty");
            }
        }
        if args.tuning.db_batch_size == 0 {
            bail!("--db-batch-size must be at least 1");
        }

        Ok(Config {
            migrations: args.migrations,
            rpc_server: MarketRpcConfig {
                host: args.rpc_host,
                port: args.rpc_port,
                max_message_size: args.rpc_max_message_size,
                request_timeout: Duration::from_millis(args.rpc_request_timeout),
            },
            rest_server: ServerAddress {
                host: args.http_host,
                port: args.http_port,
            },
            metrics: ServerAddress {
                host: args.metrics_host,
                port: args.metrics_port,
            },
            db: DatabaseConfig {
                primary: DatabaseEndpoint::try_from(args.master_db)?,
                replica: args.slave_db.into_endpoint(),
                tuning: StoreTuning::from(args.tuning),
            },
            tracing: TracingConfig {
                host: args.tracing_host,
                port: args.tracing_port,
                service_name: args.tracing_service_name,
            },
            rpc_api_key: non_empty(args.rpc_api_key),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
