mod app;
mod config;
mod db;
mod health;
mod price_client;
mod tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
