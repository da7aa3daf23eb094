use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use std::collections::BTreeMap;

use super::entity::*;
use crate::{db::*, primitives::AssetName};

/// Keeps the latest official rate per (asset, base asset) pair.
#[derive(Debug, Clone)]
pub struct OfficialCoinRates {
    write_pool: PgPool,
    read_pool: PgPool,
    tuning: StoreTuning,
}

impl OfficialCoinRates {
    pub(crate) fn new(source: &DataSource, tuning: &StoreTuning) -> Self {
        Self {
            write_pool: source.write_pool().clone(),
            read_pool: source.read_pool().clone(),
            tuning: tuning.clone(),
        }
    }

    /// Inserts new pairs and updates existing ones. A stored rate is only
    /// replaced by one with an equal or newer timestamp.
    #[instrument(name = "official_coin_rates.upsert_all", skip_all, fields(n_rates = new_rates.len()), err)]
    pub async fn upsert_all(
        &self,
        new_rates: Vec<NewOfficialCoinRate>,
    ) -> Result<u64, StoreOperationError> {
        let rates = latest_per_pair(new_rates);
        if rates.is_empty() {
            return Ok(0);
        }
        let rows_affected = execute_batched(
            &self.write_pool,
            &self.tuning,
            BINDS_PER_ROW,
            &rates,
            upsert_query,
        )
        .await?;
        Ok(rows_affected)
    }

    #[instrument(name = "official_coin_rates.find_latest", skip(self), err)]
    pub async fn find_latest(
        &self,
        asset_name: Option<&AssetName>,
        base_asset: Option<&AssetName>,
    ) -> Result<Vec<OfficialCoinRate>, StoreOperationError> {
        let rates = sqlx::query_as::<_, OfficialCoinRate>(
            r#"
                SELECT guid, asset_name, base_asset, price, timestamp
                FROM official_coin_rate
                WHERE ($1::VARCHAR IS NULL OR asset_name = $1)
                  AND ($2::VARCHAR IS NULL OR base_asset = $2)
                ORDER BY asset_name, base_asset
            "#,
        )
        .bind(asset_name.map(AssetName::as_str))
        .bind(base_asset.map(AssetName::as_str))
        .fetch_all(&self.read_pool)
        .await?;
        Ok(rates)
    }
}

// postgres rejects an upsert that touches the same row twice in one statement
fn latest_per_pair(rates: Vec<NewOfficialCoinRate>) -> Vec<NewOfficialCoinRate> {
    let mut latest: BTreeMap<(AssetName, AssetName), NewOfficialCoinRate> = BTreeMap::new();
    for rate in rates {
        let key = (rate.asset_name.clone(), rate.base_asset.clone());
        match latest.get(&key) {
            Some(existing) if existing.timestamp > rate.timestamp => (),
            _ => {
                latest.insert(key, rate);
            }
        }
    }
    latest.into_values().collect()
}

// guid, asset_name, base_asset, price, timestamp
const BINDS_PER_ROW: usize = 5;

fn upsert_query(rates: &[NewOfficialCoinRate]) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(
        "INSERT INTO official_coin_rate (guid, asset_name, base_asset, price, timestamp) ",
    );
    query.push_values(rates, |mut row, rate| {
        row.push_bind(rate.id)
            .push_bind(rate.asset_name.as_str())
            .push_bind(rate.base_asset.as_str())
            .push_bind(rate.price)
            .push_bind(rate.timestamp);
    });
    query.push(
        r#" ON CONFLICT (asset_name, base_asset) DO UPDATE
            SET price = EXCLUDED.price, timestamp = EXCLUDED.timestamp
            WHERE official_coin_rate.timestamp <= EXCLUDED.timestamp"#,
    );
    query
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn rate(asset: &str, base: &str, price: Decimal, age_secs: i64) -> NewOfficialCoinRate {
        NewOfficialCoinRate::builder()
            .asset_name(asset)
            .base_asset(base)
            .price(price)
            .timestamp(Utc::now() - Duration::seconds(age_secs))
            .build()
            .unwrap()
    }

    #[test]
    fn keeps_only_the_newest_rate_per_pair() {
        let rates = latest_per_pair(vec![
            rate("USDT", "CNY", dec!(7.10), 60),
            rate("USDT", "CNY", dec!(7.25), 0),
            rate("USDT", "CNY", dec!(7.00), 120),
            rate("USDT", "USD", dec!(1.00), 10),
        ]);
        assert_eq!(rates.len(), 2);
        let cny = rates
            .iter()
            .find(|r| r.base_asset.as_str() == "CNY")
            .unwrap();
        assert_eq!(cny.price, dec!(7.25));
    }

    #[test]
    fn upsert_only_moves_forward_in_time() {
        let rates = vec![rate("USDT", "CNY", dec!(7.1), 0)];
        let query = upsert_query(&rates);
        assert!(query.sql().contains("ON CONFLICT (asset_name, base_asset) DO UPDATE"));
        assert!(query
            .sql()
            .contains("official_coin_rate.timestamp <= EXCLUDED.timestamp"));
    }
}
