use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Connection parameters for one postgres instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseEndpoint {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub name: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl DatabaseEndpoint {
    /// A replica endpoint without host or database name counts as absent.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.name.is_empty()
    }
}

#[serde_with::serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreTuning {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "bool_true")]
    pub skip_default_transaction: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

impl Default for StoreTuning {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            skip_default_transaction: true,
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub primary: DatabaseEndpoint,
    #[serde(default)]
    pub replica: Option<DatabaseEndpoint>,
    #[serde(default)]
    pub tuning: StoreTuning,
}

fn default_batch_size() -> usize {
    3_000
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn bool_true() -> bool {
    true
}
