use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serial_test::serial;

use std::str::FromStr;

use market_server::{
    db::*, market_price::*, official_coin_rate::*,
    proto::{self, market_services_client::MarketServicesClient},
    AssetName, MarketRpcConfig, MarketRpcService,
};

fn endpoint(host_var: &str) -> DatabaseEndpoint {
    let host = std::env::var(host_var)
        .or_else(|_| std::env::var("PG_HOST"))
        .unwrap_or_else(|_| "localhost".to_string());
    DatabaseEndpoint {
        host,
        port: Some(5432),
        name: "pg".to_string(),
        user: Some("user".to_string()),
        password: Some("password".to_string()),
    }
}

async fn primary_only() -> anyhow::Result<Database> {
    let db = Database::connect(DatabaseConfig {
        primary: endpoint("PG_HOST"),
        replica: None,
        tuning: StoreTuning::default(),
    })
    .await?;
    sqlx::migrate!("../migrations")
        .run(db.source().write_pool())
        .await?;
    Ok(db)
}

fn unique_asset() -> String {
    format!("TEST-{}", uuid::Uuid::new_v4().simple())
}

fn price(asset: &str) -> anyhow::Result<NewMarketPrice> {
    Ok(NewMarketPrice::builder()
        .asset_name(asset)
        .price_usdt(dec!(64123.45))
        .volume(dec!(10.5))
        .timestamp(Utc::now())
        .build()?)
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn primary_only_reads_see_written_rows() -> anyhow::Result<()> {
    let db = primary_only().await?;
    assert_eq!(db.replica_status(), &ReplicaStatus::NotConfigured);

    let asset = unique_asset();
    let rows = db.market_prices().persist_all(vec![price(&asset)?]).await?;
    assert_eq!(rows, 1);

    let name = AssetName::from(asset.clone());
    let through_facade = db.market_prices().find_latest(Some(&name)).await?;
    let direct = Database::new(
        DataSource::Primary(db.source().write_pool().clone()),
        StoreTuning::default(),
    )
    .market_prices()
    .find_latest(Some(&name))
    .await?;

    assert_eq!(through_facade.len(), 1);
    assert_eq!(through_facade, direct);
    assert_eq!(through_facade[0].price_usdt, dec!(64123.45));
    assert!(db
        .market_prices()
        .list_asset_names()
        .await?
        .contains(&name));

    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST and REPLICA_PG_HOST"]
async fn writes_are_visible_on_primary_immediately() -> anyhow::Result<()> {
    primary_only().await?.close().await;
    let db = Database::connect(DatabaseConfig {
        primary: endpoint("PG_HOST"),
        replica: Some(endpoint("REPLICA_PG_HOST")),
        tuning: StoreTuning::default(),
    })
    .await?;
    assert_eq!(db.replica_status(), &ReplicaStatus::Connected);

    let asset = unique_asset();
    db.market_prices().persist_all(vec![price(&asset)?]).await?;

    let primary = Database::new(
        DataSource::Primary(db.source().write_pool().clone()),
        StoreTuning::default(),
    );
    let rows = primary
        .market_prices()
        .find_latest(Some(&AssetName::from(asset)))
        .await?;
    assert_eq!(rows.len(), 1);

    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn unreachable_replica_degrades_to_primary() -> anyhow::Result<()> {
    primary_only().await?.close().await;
    let db = Database::connect(DatabaseConfig {
        primary: endpoint("PG_HOST"),
        replica: Some(DatabaseEndpoint {
            host: "127.0.0.1".to_string(),
            port: Some(1),
            name: "pg".to_string(),
            ..Default::default()
        }),
        tuning: StoreTuning {
            connect_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        },
    })
    .await?;
    assert!(matches!(
        db.replica_status(),
        ReplicaStatus::Unavailable(_)
    ));

    let asset = unique_asset();
    db.market_prices().persist_all(vec![price(&asset)?]).await?;
    let rows = db
        .market_prices()
        .find_latest(Some(&AssetName::from(asset)))
        .await?;
    assert_eq!(rows.len(), 1);

    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn batches_split_large_inserts() -> anyhow::Result<()> {
    let db = primary_only().await?;
    for skip_default_transaction in [true, false] {
        let tuning = StoreTuning {
            batch_size: 2,
            skip_default_transaction,
            ..Default::default()
        };
        let prices = Database::new(DataSource::Primary(db.source().write_pool().clone()), tuning)
            .market_prices();

        let asset = unique_asset();
        let new_prices = (0..5)
            .map(|_| price(&asset))
            .collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(prices.persist_all(new_prices).await?, 5);
    }
    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn oversized_batches_stay_under_the_bind_limit() -> anyhow::Result<()> {
    let db = primary_only().await?;
    let prices = Database::new(
        DataSource::Primary(db.source().write_pool().clone()),
        StoreTuning {
            batch_size: 20_000,
            ..Default::default()
        },
    )
    .market_prices();

    let asset = unique_asset();
    let new_prices = (0..14_000)
        .map(|_| price(&asset))
        .collect::<anyhow::Result<Vec<_>>>()?;
    assert_eq!(prices.persist_all(new_prices).await?, 14_000);

    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn prices_and_rates_round_trip_through_rpc() -> anyhow::Result<()> {
    let db = primary_only().await?;
    let service = MarketRpcService::new(
        MarketRpcConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        },
        db.clone(),
    )?;
    let addr = service.start().await?;
    let mut client = MarketServicesClient::connect(format!("http://{addr}")).await?;

    let asset = unique_asset();
    let at = Utc::now().timestamp_millis();

    let stored = client
        .store_market_prices(proto::StoreMarketPricesRequest {
            market_prices: vec![proto::NewMarketPrice {
                asset_name: asset.clone(),
                price_usdt: "64123.45".to_string(),
                volume: "10.5".to_string(),
                timestamp: at,
            }],
        })
        .await?
        .into_inner();
    assert_eq!(stored.rows_affected, 1);

    let prices = client
        .get_market_price(proto::MarketPriceRequest {
            asset_name: asset.clone(),
        })
        .await?
        .into_inner()
        .market_prices;
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].asset_name, asset);
    assert_eq!(Decimal::from_str(&prices[0].price_usdt)?, dec!(64123.45));
    assert_eq!(Decimal::from_str(&prices[0].volume)?, dec!(10.5));
    assert_eq!(prices[0].timestamp, at);

    let assets = client
        .get_support_asset(proto::SupportAssetRequest {})
        .await?
        .into_inner()
        .asset_names;
    assert!(assets.contains(&asset));

    let stored = client
        .store_official_coin_rates(proto::StoreOfficialCoinRatesRequest {
            official_coin_rates: vec![proto::NewOfficialCoinRate {
                asset_name: asset.clone(),
                base_asset: "CNY".to_string(),
                price: "7.25".to_string(),
                timestamp: at,
            }],
        })
        .await?
        .into_inner();
    assert_eq!(stored.rows_affected, 1);

    let rates = client
        .get_official_coin_rate(proto::OfficialCoinRateRequest {
            asset_name: asset.clone(),
            base_asset: "CNY".to_string(),
        })
        .await?
        .into_inner()
        .official_coin_rates;
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].base_asset, "CNY");
    assert_eq!(Decimal::from_str(&rates[0].price)?, dec!(7.25));
    assert_eq!(rates[0].timestamp, at);

    drop(client);
    service.stop().await;
    db.close().await;
    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres reachable through PG_HOST"]
async fn official_rates_only_move_forward() -> anyhow::Result<()> {
    let db = primary_only().await?;
    let rates = db.official_coin_rates();
    let asset = unique_asset();

    let now = Utc::now();
    let rate = |price, at| {
        NewOfficialCoinRate::builder()
            .asset_name(asset.clone())
            .base_asset("CNY")
            .price(price)
            .timestamp(at)
            .build()
    };
    rates.upsert_all(vec![rate(dec!(7.20), now)?]).await?;
    rates
        .upsert_all(vec![rate(dec!(7.00), now - chrono::Duration::minutes(5))?])
        .await?;

    let stored = rates
        .find_latest(Some(&AssetName::from(asset.clone())), None)
        .await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].price, dec!(7.20));

    rates
        .upsert_all(vec![rate(dec!(7.30), now + chrono::Duration::minutes(1))?])
        .await?;
    let stored = rates
        .find_latest(Some(&AssetName::from(asset)), Some(&AssetName::from("CNY")))
        .await?;
    assert_eq!(stored[0].price, dec!(7.30));

    db.close().await;
    Ok(())
}
