use anyhow::Context;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use std::sync::Arc;

use market_server::{LifecycleState, MarketRpcService, ReplicaStatus};

use crate::config::ServerAddress;

#[derive(Debug, Serialize)]
struct HealthReport {
    rpc: LifecycleState,
    replica: ReplicaStatus,
}

async fn health(State(service): State<Arc<MarketRpcService>>) -> impl IntoResponse {
    let rpc = service.state();
    let status = if rpc == LifecycleState::Listening {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = HealthReport {
        rpc,
        replica: service.database().replica_status().clone(),
    };
    (status, Json(report))
}

fn router(service: Arc<MarketRpcService>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .with_state(service)
}

pub async fn run(addr: ServerAddress, service: Arc<MarketRpcService>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((addr.host.as_str(), addr.port))
        .await
        .context("Bind health server")?;
    axum::serve(listener, router(service))
        .await
        .context("Serve health server")
}
