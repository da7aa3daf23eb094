#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

pub mod db;
pub mod market_price;
pub mod official_coin_rate;
mod primitives;
mod server;

pub use db::{Database, DatabaseConfig, DatabaseEndpoint, ReplicaStatus, StoreTuning};
pub use primitives::AssetName;
pub use server::*;
