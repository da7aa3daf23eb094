use tonic::{
    metadata::{Ascii, MetadataValue},
    service::Interceptor,
    Request, Status,
};

use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Wraps every unary call before it reaches the service. Returning an
/// error rejects the call with that status.
pub trait RpcInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status>;
}

impl<F> RpcInterceptor for F
where
    F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
{
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status> {
        self(request)
    }
}

/// Ordered list of interceptors, applied first to last. Empty by default.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn RpcInterceptor>>,
}

impl InterceptorChain {
    pub fn with(mut self, interceptor: impl RpcInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Interceptor for InterceptorChain {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.interceptors
            .iter()
            .try_fold(request, |request, interceptor| interceptor.intercept(request))
    }
}

/// Rejects calls whose `x-api-key` metadata doesn't match.
pub struct ApiKeyInterceptor {
    key: MetadataValue<Ascii>,
}

impl ApiKeyInterceptor {
    pub fn new(key: &str) -> Result<Self, tonic::metadata::errors::InvalidMetadataValue> {
        Ok(Self { key: key.parse()? })
    }
}

impl RpcInterceptor for ApiKeyInterceptor {
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status> {
        match request.metadata().get(API_KEY_HEADER) {
            Some(key) if *key == self.key => Ok(request),
            Some(_) => Err(Status::unauthenticated("invalid api key")),
            None => Err(Status::unauthenticated("missing api key")),
        }
    }
}

/// Logs the metadata keys of every call at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLogInterceptor;

impl RpcInterceptor for RequestLogInterceptor {
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status> {
        tracing::debug!(
            remote_addr = ?request.remote_addr(),
            metadata = ?request.metadata().keys().collect::<Vec<_>>(),
            "incoming market rpc call"
        );
        Ok(request)
    }
}
