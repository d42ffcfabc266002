use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

use apify_http::handler::Handler;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use tracing::warn;

use crate::body::ResponseBody;
use crate::chain::Chain;
use crate::error::ApiError;
use crate::request::ApiRequest;
use crate::responder::Responder;

/// Chains keyed by exact request path.
///
/// Paths are matched verbatim against the request path, without the query. A path with no
/// chain is answered `404` with `{"errno":404,"errmsg":"not found"}`.
#[derive(Default)]
pub struct ApiMap {
    chains: HashMap<String, Chain>,
}

impl ApiMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn api(mut self, path: impl Into<String>, chain: Chain) -> Self {
        self.insert(path, chain);
        self
    }

    /// Registers `chain` at `path`, returning the chain it replaces.
    pub fn insert(&mut self, path: impl Into<String>, chain: Chain) -> Option<Chain> {
        self.chains.insert(path.into(), chain)
    }

    pub fn get(&self, path: &str) -> Option<&Chain> {
        self.chains.get(path)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub async fn serve(&self, request: ApiRequest) -> Response<ResponseBody> {
        match self.chains.get(request.uri().path()) {
            Some(chain) => chain.serve(request).await,
            None => {
                warn!(url = request.request_uri(), "no api registered");
                ApiError::new(404, "not found", None).with_status(404).response_to(&request)
            }
        }
    }
}

impl fmt::Debug for ApiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.chains.keys().collect();
        paths.sort();
        f.debug_struct("ApiMap").field("paths", &paths).finish()
    }
}

#[async_trait]
impl Handler for ApiMap {
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Self::RespBody>, Self::Error> {
        Ok(self.serve(ApiRequest::from(req)).await)
    }
}
