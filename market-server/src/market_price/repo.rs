use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use super::entity::*;
use crate::{db::*, primitives::AssetName};

/// Appends to and reads from `market_price`. Inserts always go to the
/// primary, lookups to the replica when one is configured.
#[derive(Debug, Clone)]
pub struct MarketPrices {
    write_pool: PgPool,
    read_pool: PgPool,
    tuning: StoreTuning,
}

impl MarketPrices {
    pub(crate) fn new(source: &DataSource, tuning: &StoreTuning) -> Self {
        Self {
            write_pool: source.write_pool().clone(),
            read_pool: source.read_pool().clone(),
            tuning: tuning.clone(),
        }
    }

    #[instrument(name = "market_prices.persist_all", skip_all, fields(n_prices = new_prices.len()), err)]
    pub async fn persist_all(
        &self,
        new_prices: Vec<NewMarketPrice>,
    ) -> Result<u64, StoreOperationError> {
        if new_prices.is_empty() {
            return Ok(0);
        }
        let rows_affected = execute_batched(
            &self.write_pool,
            &self.tuning,
            BINDS_PER_ROW,
            &new_prices,
            insert_query,
        )
        .await?;
        Ok(rows_affected)
    }

    /// Most recent price per asset, optionally restricted to one asset.
    #[instrument(name = "market_prices.find_latest", skip(self), err)]
    pub async fn find_latest(
        &self,
        asset_name: Option<&AssetName>,
    ) -> Result<Vec<MarketPrice>, StoreOperationError> {
        let prices = sqlx::query_as::<_, MarketPrice>(
            r#"
                SELECT DISTINCT ON (asset_name) guid, asset_name, price_usdt, volume, timestamp
                FROM market_price
                WHERE $1::VARCHAR IS NULL OR asset_name = $1
                ORDER BY asset_name, timestamp DESC
            "#,
        )
        .bind(asset_name.map(AssetName::as_str))
        .fetch_all(&self.read_pool)
        .await?;
        Ok(prices)
    }

    #[instrument(name = "market_prices.list_asset_names", skip(self), err)]
    pub async fn list_asset_names(&self) -> Result<Vec<AssetName>, StoreOperationError> {
        let names = sqlx::query_scalar::<_, AssetName>(
            "SELECT DISTINCT asset_name FROM market_price ORDER BY asset_name",
        )
        .fetch_all(&self.read_pool)
        .await?;
        Ok(names)
    }
}

// guid, asset_name, price_usdt, volume, timestamp
const BINDS_PER_ROW: usize = 5;

fn insert_query(prices: &[NewMarketPrice]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(
        "INSERT INTO market_price (guid, asset_name, price_usdt, volume, timestamp) ",
    );
    query.push_values(prices, |mut row, price| {
        row.push_bind(price.id)
            .push_bind(price.asset_name.as_str())
            .push_bind(price.price_usdt)
            .push_bind(price.volume)
            .push_bind(price.timestamp);
    });
    query
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    fn lazy_pool(host: &str) -> PgPool {
        connect_lazy(
            &DatabaseEndpoint {
                host: host.to_string(),
                name: "market".to_string(),
                ..Default::default()
            },
            &StoreTuning::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn writes_bind_to_primary_and_reads_to_replica() {
        let source = DataSource::PrimaryWithReplica {
            primary: lazy_pool("db1"),
            replica: lazy_pool("db2"),
        };
        let prices = MarketPrices::new(&source, &StoreTuning::default());
        assert_eq!(prices.write_pool.connect_options().get_host(), "db1");
        assert_eq!(prices.read_pool.connect_options().get_host(), "db2");
    }

    #[test]
    fn insert_query_has_one_tuple_per_price() {
        let prices: Vec<_> = (0..3)
            .map(|i| {
                NewMarketPrice::builder()
                    .asset_name(format!("ASSET{i}"))
                    .price_usdt(dec!(1.5))
                    .volume(dec!(100))
                    .timestamp(Utc::now())
                    .build()
                    .unwrap()
            })
            .collect();
        let query = insert_query(&prices);
        let sql = query.sql();
        assert!(sql.starts_with("INSERT INTO market_price"));
        assert!(sql.ends_with("($11, $12, $13, $14, $15)"));
    }
}
