use chrono::{DateTime, Utc};
use derive_builder::Builder;
use rust_decimal::Decimal;

use crate::primitives::AssetName;

shared::entity_id! { OfficialCoinRateId }

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct OfficialCoinRate {
    #[sqlx(rename = "guid")]
    pub id: OfficialCoinRateId,
    pub asset_name: AssetName,
    pub base_asset: AssetName,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Builder, Clone, Debug)]
pub struct NewOfficialCoinRate {
    #[builder(private)]
    pub(super) id: OfficialCoinRateId,
    #[builder(setter(into))]
    pub(super) asset_name: AssetName,
    #[builder(setter(into))]
    pub(super) base_asset: AssetName,
    pub(super) price: Decimal,
    pub(super) timestamp: DateTime<Utc>,
}

impl NewOfficialCoinRate {
    pub fn builder() -> NewOfficialCoinRateBuilder {
        let mut builder = NewOfficialCoinRateBuilder::default();
        builder.id(OfficialCoinRateId::new());
        builder
    }
}
