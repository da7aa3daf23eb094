use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Hard ceiling for `max_message_size`.
pub const MAX_MESSAGE_SIZE_LIMIT: usize = 512 * 1024 * 1024;

#[serde_with::serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MarketRpcConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Applies to both decoding and encoding.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Upper bound per call, tightened by the client's `grpc-timeout`.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

impl Default for MarketRpcConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl MarketRpcConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8980
}

fn default_max_message_size() -> usize {
    64 * 1024 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}
