use tonic::transport::channel::Channel;
use url::Url;

use market_server::{proto, API_KEY_HEADER};
type ProtoClient = proto::market_services_client::MarketServicesClient<Channel>;

pub struct PriceClientConfig {
    pub url: Url,
    pub api_key: Option<String>,
}

impl PriceClientConfig {
    pub fn new(url: Option<Url>, api_key: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            url: match url {
                Some(url) => url,
                None => Url::parse("http://localhost:8980")?,
            },
            api_key,
        })
    }
}

pub struct PriceClient {
    config: PriceClientConfig,
}

impl PriceClient {
    pub fn new(config: PriceClientConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> anyhow::Result<ProtoClient> {
        match ProtoClient::connect(self.config.url.to_string()).await {
            Ok(client) => Ok(client),
            Err(err) => {
                eprintln!(
                    "Couldn't connect to market server\nAre you sure its running on {}?\n",
                    self.config.url
                );
                Err(anyhow::anyhow!(err))
            }
        }
    }

    fn request<T>(&self, message: T) -> anyhow::Result<tonic::Request<T>> {
        let mut request = tonic::Request::new(message);
        if let Some(key) = self.config.api_key.as_deref() {
            request.metadata_mut().insert(API_KEY_HEADER, key.parse()?);
        }
        Ok(request)
    }

    pub async fn get_market_price(&self, asset_name: Option<String>) -> anyhow::Result<()> {
        let mut client = self.connect().await?;
        let request = self.request(proto::MarketPriceRequest {
            asset_name: asset_name.unwrap_or_default(),
        })?;
        let response = client.get_market_price(request).await?;
        output_json(response)
    }

    pub async fn get_official_coin_rate(
        &self,
        asset_name: Option<String>,
        base_asset: Option<String>,
    ) -> anyhow::Result<()> {
        let mut client = self.connect().await?;
        let request = self.request(proto::OfficialCoinRateRequest {
            asset_name: asset_name.unwrap_or_default(),
            base_asset: base_asset.unwrap_or_default(),
        })?;
        let response = client.get_official_coin_rate(request).await?;
        output_json(response)
    }

    pub async fn get_support_asset(&self) -> anyhow::Result<()> {
        let mut client = self.connect().await?;
        let request = self.request(proto::SupportAssetRequest {})?;
        let response = client.get_support_asset(request).await?;
        output_json(response)
    }
}

fn output_json<T: serde::Serialize>(response: tonic::Response<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&response.into_inner())?);
    Ok(())
}
