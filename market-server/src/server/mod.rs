mod config;
mod convert;
mod error;
mod interceptor;
mod timeout;

#[allow(clippy::all)]
pub mod proto {
    tonic::include_proto!("services.market.v1");
}

use opentelemetry::propagation::Extractor;
use proto::{
    market_services_server::{self, MarketServices},
    MarketPriceRequest, MarketPriceResponse, OfficialCoinRateRequest, OfficialCoinRateResponse,
    StoreMarketPricesRequest, StoreOfficialCoinRatesRequest, StoreResponse, SupportAssetRequest,
    SupportAssetResponse,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{service::interceptor::InterceptedService, transport::Server, Request, Response, Status};
use tracing::instrument;

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use crate::{
    db::{self, Database},
    market_price::*,
    official_coin_rate::*,
    primitives::AssetName,
};

pub use config::*;
pub use error::*;
pub use interceptor::*;
pub use timeout::request_deadline;

pub struct Market {
    market_prices: MarketPrices,
    official_coin_rates: OfficialCoinRates,
    request_timeout: Duration,
}

#[tonic::async_trait]
impl MarketServices for Market {
    #[instrument(name = "market_server.get_support_asset", skip_all,
        fields(error, error.level, error.message),
        err
    )]
    async fn get_support_asset(
        &self,
        request: Request<SupportAssetRequest>,
    ) -> Result<Response<SupportAssetResponse>, Status> {
        shared::tracing::record_error_by(status_level, || async move {
            extract_tracing(&request);
            let deadline = request_deadline(&request, self.request_timeout);
            let asset_names =
                db::within(deadline, self.market_prices.list_asset_names()).await?;
            Ok(Response::new(SupportAssetResponse {
                asset_names: asset_names.into_iter().map(|n| n.to_string()).collect(),
            }))
        })
        .await
    }

    #[instrument(name = "market_server.get_market_price", skip_all,
        fields(asset_name = %request.get_ref().asset_name, error, error.level, error.message),
        err
    )]
    async fn get_market_price(
        &self,
        request: Request<MarketPriceRequest>,
    ) -> Result<Response<MarketPriceResponse>, Status> {
        shared::tracing::record_error_by(status_level, || async move {
            extract_tracing(&request);
            let deadline = request_deadline(&request, self.request_timeout);
            let asset_name = optional_asset(request.into_inner().asset_name);
            let prices = db::within(
                deadline,
                self.market_prices.find_latest(asset_name.as_ref()),
            )
            .await?;
            Ok(Response::new(MarketPriceResponse {
                market_prices: prices.into_iter().map(proto::MarketPrice::from).collect(),
            }))
        })
        .await
    }

    #[instrument(name = "market_server.get_official_coin_rate", skip_all,
        fields(asset_name = %request.get_ref().asset_name,
               base_asset = %request.get_ref().base_asset,
               error, error.level, error.message),
        err
    )]
    async fn get_official_coin_rate(
        &self,
        request: Request<OfficialCoinRateRequest>,
    ) -> Result<Response<OfficialCoinRateResponse>, Status> {
        shared::tracing::record_error_by(status_level, || async move {
            extract_tracing(&request);
            let deadline = request_deadline(&request, self.request_timeout);
            let req = request.into_inner();
            let asset_name = optional_asset(req.asset_name);
            let base_asset = optional_asset(req.base_asset);
            let rates = db::within(
                deadline,
                self.official_coin_rates
                    .find_latest(asset_name.as_ref(), base_asset.as_ref()),
            )
            .await?;
            Ok(Response::new(OfficialCoinRateResponse {
                official_coin_rates: rates
                    .into_iter()
                    .map(proto::OfficialCoinRate::from)
                    .collect(),
            }))
        })
        .await
    }

    #[instrument(name = "market_server.store_market_prices", skip_all,
        fields(n_prices = request.get_ref().market_prices.len(), error, error.level, error.message),
        err
    )]
    async fn store_market_prices(
        &self,
        request: Request<StoreMarketPricesRequest>,
    ) -> Result<Response<StoreResponse>, Status> {
        shared::tracing::record_error_by(status_level, || async move {
            extract_tracing(&request);
            let deadline = request_deadline(&request, self.request_timeout);
            let new_prices = request
                .into_inner()
                .market_prices
                .into_iter()
                .map(NewMarketPrice::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            let rows_affected =
                db::within(deadline, self.market_prices.persist_all(new_prices)).await?;
            Ok(Response::new(StoreResponse { rows_affected }))
        })
        .await
    }

    #[instrument(name = "market_server.store_official_coin_rates", skip_all,
        fields(n_rates = request.get_ref().official_coin_rates.len(), error, error.level, error.message),
        err
    )]
    async fn store_official_coin_rates(
        &self,
        request: Request<StoreOfficialCoinRatesRequest>,
    ) -> Result<Response<StoreResponse>, Status> {
        shared::tracing::record_error_by(status_level, || async move {
            extract_tracing(&request);
            let deadline = request_deadline(&request, self.request_timeout);
            let new_rates = request
                .into_inner()
                .official_coin_rates
                .into_iter()
                .map(NewOfficialCoinRate::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            let rows_affected =
                db::within(deadline, self.official_coin_rates.upsert_all(new_rates)).await?;
            Ok(Response::new(StoreResponse { rows_affected }))
        })
        .await
    }
}

// rejected client input is not a server fault
fn status_level(status: &Status) -> tracing::Level {
    match status.code() {
        tonic::Code::InvalidArgument | tonic::Code::Unauthenticated => tracing::Level::WARN,
        _ => tracing::Level::ERROR,
    }
}

fn optional_asset(raw: String) -> Option<AssetName> {
    if raw.is_empty() {
        None
    } else {
        Some(AssetName::from(raw))
    }
}

const CONSTRUCTED: u8 = 0;
const LISTENING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Constructed,
    Listening,
    Stopped,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            CONSTRUCTED => LifecycleState::Constructed,
            LISTENING => LifecycleState::Listening,
            _ => LifecycleState::Stopped,
        }
    }
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Lifecycle shell around the gRPC server:
/// `Constructed -> Listening -> Stopped`.
pub struct MarketRpcService {
    config: MarketRpcConfig,
    database: Database,
    interceptors: InterceptorChain,
    state: Arc<AtomicU8>,
    local_addr: OnceLock<SocketAddr>,
    running: tokio::sync::Mutex<Option<RunningServer>>,
}

impl MarketRpcService {
    pub fn new(config: MarketRpcConfig, database: Database) -> Result<Self, MarketServerError> {
        if config.max_message_size == 0 || config.max_message_size > MAX_MESSAGE_SIZE_LIMIT {
            return Err(MarketServerError::InvalidConfig(format!(
                "max_message_size must be between 1 and {MAX_MESSAGE_SIZE_LIMIT} bytes, got {}",
                config.max_message_size
            )));
        }
        Ok(Self {
            config,
            database,
            interceptors: InterceptorChain::default(),
            state: Arc::new(AtomicU8::new(CONSTRUCTED)),
            local_addr: OnceLock::new(),
            running: tokio::sync::Mutex::new(None),
        })
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Binds the listener and spawns the accept loop.
    ///
    /// Returns once the listener is bound so that bind failures surface here
    /// rather than in the background task.
    #[instrument(name = "market_rpc_service.start", skip_all, fields(addr = %self.config.listen_addr()), err)]
    pub async fn start(&self) -> Result<SocketAddr, MarketServerError> {
        let mut running = self.running.lock().await;
        match self.state() {
            LifecycleState::Constructed => (),
            state => return Err(MarketServerError::InvalidState(state)),
        }

        let addr = self.config.listen_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                tracing::error!(%addr, error = %source, "failed to listen");
                return Err(MarketServerError::Bind { addr, source });
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| MarketServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        if let Err(state) = self.state.compare_exchange(
            CONSTRUCTED,
            LISTENING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(MarketServerError::InvalidState(LifecycleState::from_u8(state)));
        }
        let _ = self.local_addr.set(local_addr);

        let (shutdown, shutdown_recv) = oneshot::channel();
        let router = Server::builder()
            .timeout(self.config.request_timeout)
            .add_service(self.service());
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tracing::info!(%local_addr, "start market rpc service");
            let shutdown_signal = async {
                let _ = shutdown_recv.await;
            };
            match router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal)
                .await
            {
                Ok(()) => tracing::info!(%local_addr, "market rpc service stopped"),
                Err(e) if state.load(Ordering::Acquire) == STOPPED => {
                    tracing::debug!(error = %e, "market rpc service exited after stop")
                }
                Err(e) => {
                    tracing::error!(error = %e, "market rpc service failed");
                    state.store(STOPPED, Ordering::Release);
                }
            }
        });
        *running = Some(RunningServer { shutdown, handle });

        Ok(local_addr)
    }

    /// Marks the service stopped and shuts the accept loop down gracefully.
    /// Safe to call from any state and any number of times.
    pub async fn stop(&self) {
        let previous = self.state.swap(STOPPED, Ordering::AcqRel);
        let running = self.running.lock().await.take();
        if let Some(RunningServer { shutdown, handle }) = running {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "market rpc service task did not finish cleanly");
            }
        }
        if previous != STOPPED {
            tracing::info!("market rpc service stopped");
        }
    }

    pub fn stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The bound address, once `start` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn service(
        &self,
    ) -> InterceptedService<market_services_server::MarketServicesServer<Market>, InterceptorChain>
    {
        let market = Market {
            market_prices: self.database.market_prices(),
            official_coin_rates: self.database.official_coin_rates(),
            request_timeout: self.config.request_timeout,
        };
        let server = market_services_server::MarketServicesServer::new(market)
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size);
        InterceptedService::new(server, self.interceptors.clone())
    }
}

pub fn extract_tracing<T>(request: &Request<T>) {
    shared::tracing::set_parent_from(&RequestContextExtractor(request))
}

struct RequestContextExtractor<'a, T>(&'a Request<T>);

impl<'a, T> Extractor for RequestContextExtractor<'a, T> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.metadata().get(key).and_then(|s| s.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .metadata()
            .keys()
            .filter_map(|k| {
                if let tonic::metadata::KeyRef::Ascii(key) = k {
                    Some(key.as_str())
                } else {
                    None
                }
            })
            .collect()
    }
}
