use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use std::str::FromStr;

use super::{error::*, proto};
use crate::{db::StoreOperationError, market_price::*, official_coin_rate::*};

impl From<StoreOperationError> for tonic::Status {
    fn from(err: StoreOperationError) -> Self {
        match err {
            StoreOperationError::DeadlineExceeded(_) => {
                tonic::Status::deadline_exceeded(err.to_string())
            }
            StoreOperationError::Sqlx(_) => tonic::Status::internal(err.to_string()),
        }
    }
}

impl From<ConvertError> for tonic::Status {
    fn from(err: ConvertError) -> Self {
        tonic::Status::invalid_argument(err.to_string())
    }
}

impl From<MarketPrice> for proto::MarketPrice {
    fn from(price: MarketPrice) -> Self {
        Self {
            guid: price.id.to_string(),
            asset_name: price.asset_name.to_string(),
            price_usdt: price.price_usdt.to_string(),
            volume: price.volume.to_string(),
            timestamp: price.timestamp.timestamp_millis(),
        }
    }
}

impl From<OfficialCoinRate> for proto::OfficialCoinRate {
    fn from(rate: OfficialCoinRate) -> Self {
        Self {
            guid: rate.id.to_string(),
            asset_name: rate.asset_name.to_string(),
            base_asset: rate.base_asset.to_string(),
            price: rate.price.to_string(),
            timestamp: rate.timestamp.timestamp_millis(),
        }
    }
}

impl TryFrom<proto::NewMarketPrice> for NewMarketPrice {
    type Error = ConvertError;

    fn try_from(price: proto::NewMarketPrice) -> Result<Self, Self::Error> {
        if price.asset_name.is_empty() {
            return Err(ConvertError::MissingField("asset_name".to_string()));
        }
        NewMarketPrice::builder()
            .asset_name(price.asset_name)
            .price_usdt(parse_decimal(&price.price_usdt)?)
            .volume(parse_decimal(&price.volume)?)
            .timestamp(parse_timestamp(price.timestamp)?)
            .build()
            .map_err(|e| ConvertError::MissingField(e.to_string()))
    }
}

impl TryFrom<proto::NewOfficialCoinRate> for NewOfficialCoinRate {
    type Error = ConvertError;

    fn try_from(rate: proto::NewOfficialCoinRate) -> Result<Self, Self::Error> {
        if rate.asset_name.is_empty() {
            return Err(ConvertError::MissingField("asset_name".to_string()));
        }
        if rate.base_asset.is_empty() {
            return Err(ConvertError::MissingField("base_asset".to_string()));
        }
        NewOfficialCoinRate::builder()
            .asset_name(rate.asset_name)
            .base_asset(rate.base_asset)
            .price(parse_decimal(&rate.price)?)
            .timestamp(parse_timestamp(rate.timestamp)?)
            .build()
            .map_err(|e| ConvertError::MissingField(e.to_string()))
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, ConvertError> {
    Decimal::from_str(raw).map_err(|e| ConvertError::InvalidDecimal(raw.to_string(), e))
}

fn parse_timestamp(millis: i64) -> Result<DateTime<Utc>, ConvertError> {
    DateTime::from_timestamp_millis(millis).ok_or(ConvertError::InvalidTimestamp(millis))
}
