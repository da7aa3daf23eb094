use chrono::{DateTime, Utc};
use derive_builder::Builder;
use rust_decimal::Decimal;

use crate::primitives::AssetName;

shared::entity_id! { MarketPriceId }

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct MarketPrice {
    #[sqlx(rename = "guid")]
    pub id: MarketPriceId,
    pub asset_name: AssetName,
    pub price_usdt: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Builder, Clone, Debug)]
pub struct NewMarketPrice {
    #[builder(private)]
    pub(super) id: MarketPriceId,
    #[builder(setter(into))]
    pub(super) asset_name: AssetName,
    pub(super) price_usdt: Decimal,
    pub(super) volume: Decimal,
    pub(super) timestamp: DateTime<Utc>,
}

impl NewMarketPrice {
    pub fn builder() -> NewMarketPriceBuilder {
        let mut builder = NewMarketPriceBuilder::default();
        builder.id(MarketPriceId::new());
        builder
    }

    pub fn id(&self) -> MarketPriceId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn builder_assigns_an_id() {
        let first = NewMarketPrice::builder()
            .asset_name("BTC")
            .price_usdt(dec!(64000.5))
            .volume(dec!(12))
            .timestamp(Utc::now())
            .build()
            .unwrap();
        let second = NewMarketPrice::builder()
            .asset_name("BTC")
            .price_usdt(dec!(64000.5))
            .volume(dec!(12))
            .timestamp(Utc::now())
            .build()
            .unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn builder_requires_a_price() {
        let res = NewMarketPrice::builder()
            .asset_name("BTC")
            .volume(dec!(12))
            .timestamp(Utc::now())
            .build();
        assert!(res.is_err());
    }
}
