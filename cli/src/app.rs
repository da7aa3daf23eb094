use anyhow::Context;
use clap::{Parser, Subcommand};
use url::Url;

use std::{path::PathBuf, sync::Arc};

use market_server::{
    ApiKeyInterceptor, Database, DatabaseEndpoint, InterceptorChain, MarketRpcService,
    RequestLogInterceptor, StoreTuning,
};

use super::{config::*, price_client::*};

#[derive(Parser)]
#[clap(version, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the market rpc server
    Run {
        /// Output config on crash
        #[clap(long, env = "MARKET_CRASH_REPORT_CONFIG")]
        crash_report_config: Option<bool>,
        #[clap(flatten)]
        args: RunArgs,
    },
    /// Applies the database migrations to the master database
    Migrate {
        /// Path for database migrations
        #[clap(long, env = "MARKET_MIGRATIONS_DIR", default_value = "./migrations")]
        migrations: PathBuf,
        #[clap(flatten)]
        master_db: MasterDbArgs,
        #[clap(flatten)]
        tuning: StoreTuningArgs,
    },
    /// Gets the latest prices from a running market server
    Price {
        /// market server URL
        #[clap(short, long, env = "MARKET_RPC_URL")]
        url: Option<Url>,
        /// Value sent in the x-api-key metadata
        #[clap(long, env = "MARKET_RPC_API_KEY")]
        api_key: Option<String>,
        /// Only this asset
        #[clap(short, long)]
        asset: Option<String>,
        /// Quote asset of the official rates
        #[clap(short, long, requires = "rates")]
        base: Option<String>,
        /// Show official coin rates instead of market prices
        #[clap(short, long)]
        rates: bool,
        /// List the assets with a market price
        #[clap(long, conflicts_with_all = ["rates", "asset"])]
        assets: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            crash_report_config,
            args,
        } => {
            let config = Config::try_from(args)?;
            match (run_cmd(config.clone()).await, crash_report_config) {
                (Err(e), Some(true)) => {
                    println!("Market services were started with the following config:");
                    println!("{}", serde_yaml::to_string(&config)?);
                    return Err(e);
                }
                (Err(e), _) => return Err(e),
                _ => (),
            }
        }
        Command::Migrate {
            migrations,
            master_db,
            tuning,
        } => {
            let endpoint = DatabaseEndpoint::try_from(master_db)?;
            crate::db::migrate(&endpoint, &StoreTuning::from(tuning), &migrations).await?;
            println!("Migrations applied from {}", migrations.display());
        }
        Command::Price {
            url,
            api_key,
            asset,
            base,
            rates,
            assets,
        } => {
            let client = PriceClient::new(PriceClientConfig::new(url, api_key)?);
            if assets {
                client.get_support_asset().await?
            } else if rates {
                client.get_official_coin_rate(asset, base).await?
            } else {
                client.get_market_price(asset).await?
            }
        }
    }
    Ok(())
}

async fn run_cmd(
    Config {
        migrations: _,
        rpc_server,
        rest_server,
        metrics: _,
        db,
        tracing,
        rpc_api_key,
    }: Config,
) -> anyhow::Result<()> {
    println!("Market services - v{}", env!("CARGO_PKG_VERSION"));
    crate::tracing::init_tracer(tracing)?;

    let database = Database::connect(db)
        .await
        .context("Couldn't connect to master database")?;

    let mut interceptors = InterceptorChain::default().with(RequestLogInterceptor);
    if let Some(key) = rpc_api_key {
        interceptors = interceptors
            .with(ApiKeyInterceptor::new(&key).context("Invalid rpc api key")?);
    }

    println!("Starting market rpc server on {}", rpc_server.listen_addr());
    let service = Arc::new(
        MarketRpcService::new(rpc_server, database.clone())?.with_interceptors(interceptors),
    );
    service
        .start()
        .await
        .context("Couldn't start market rpc server")?;

    println!(
        "Starting health server on {}:{}",
        rest_server.host, rest_server.port
    );
    let health = tokio::spawn(crate::health::run(rest_server, Arc::clone(&service)));

    let reason = tokio::select! {
        res = health => match res {
            Ok(res) => res.context("Health server error"),
            Err(e) => Err(anyhow::anyhow!(e).context("Health server task failed")),
        },
        res = tokio::signal::ctrl_c() => {
            println!("Shutting down");
            res.context("Couldn't listen for shutdown signal")
        }
    };

    service.stop().await;
    database.close().await;
    reason
}
