//! Ordered composition of stages behind one recovery barrier.
//!
//! Every stage sees the same [`RequestContext`]. A stage either lets the chain go on
//! ([`Flow::Next`]), answers the request ([`Flow::Respond`]) or stops it with a [`Halt`].
//! A panic in any stage is caught and answered with a plain-text `500`.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;

use apify_http::handler::Handler;
use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::{Request, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::access_log::{AccessLog, IdentityResolver};
use crate::body::ResponseBody;
use crate::context::RequestContext;
use crate::error::{BoxError, Halt};
use crate::fn_trait::RpcFn;
use crate::handler::json_rpc;
use crate::json::JsonWriter;
use crate::request::ApiRequest;
use crate::responder::internal_error;

pub enum Flow {
    Next,
    Respond(Response<ResponseBody>),
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str("Next"),
            Self::Respond(response) => f.debug_tuple("Respond").field(&response.status()).finish(),
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    async fn serve(&self, ctx: &mut RequestContext) -> Result<Flow, Halt>;
}

pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("stages", &self.stages.len()).finish()
    }
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder { stages: Vec::new() }
    }

    /// `[auth, access_log, dispatcher, JsonWriter]`
    pub fn json_auth<A, L, D>(auth: A, access_log: L, dispatcher: D) -> Self
    where
        A: Stage + 'static,
        L: Stage + 'static,
        D: Stage + 'static,
    {
        Self::builder().stage(auth).stage(access_log).stage(dispatcher).stage(JsonWriter).build()
    }

    /// `[access_log, dispatcher, JsonWriter]`
    pub fn json<L, D>(access_log: L, dispatcher: D) -> Self
    where
        L: Stage + 'static,
        D: Stage + 'static,
    {
        Self::builder().stage(access_log).stage(dispatcher).stage(JsonWriter).build()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the chain for one request and always produces exactly one response.
    pub async fn serve(&self, request: ApiRequest) -> Response<ResponseBody> {
        let mut ctx = RequestContext::new(request.clone());

        let outcome = AssertUnwindSafe(self.run(&mut ctx)).catch_unwind().await;
        let mut response = match outcome {
            Ok(Ok(Some(response))) => response,
            Ok(Ok(None)) => Response::new(ResponseBody::empty()),
            Ok(Err(Halt::Render(responder))) => responder.response_to(&request),
            Ok(Err(Halt::Error(e))) => {
                error!(url = request.request_uri(), cause = %e, "chain stopped with error");
                internal_error(&e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(url = request.request_uri(), cause = message, "stage panicked");
                internal_error(message)
            }
        };

        ctx.sink().merge_into(response.headers_mut()).await;
        response
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Option<Response<ResponseBody>>, Halt> {
        for stage in &self.stages {
            match stage.serve(ctx).await? {
                Flow::Next => {}
                Flow::Respond(response) => return Ok(Some(response)),
            }
        }
        Ok(None)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[async_trait]
impl Handler for Chain {
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Self::RespBody>, Self::Error> {
        Ok(self.serve(ApiRequest::from(req)).await)
    }
}

pub struct ChainBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder").field("stages", &self.stages.len()).finish()
    }
}

impl ChainBuilder {
    #[must_use]
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Adds a stage whose construction may have failed.
    ///
    /// A failed construction does not abort the build: the chain gets a stage that answers
    /// every request with `500` and the construction error.
    #[must_use]
    pub fn try_stage<S, E>(self, stage: Result<S, E>) -> Self
    where
        S: Stage + 'static,
        E: Into<BoxError>,
    {
        match stage {
            Ok(stage) => self.stage(stage),
            Err(e) => {
                let e: BoxError = e.into();
                warn!(cause = %e, "stage construction failed");
                self.stage(FailedStage { message: e.to_string() })
            }
        }
    }

    pub fn build(self) -> Chain {
        Chain { stages: self.stages }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FailedStage {
    message: String,
}

#[async_trait]
impl Stage for FailedStage {
    async fn serve(&self, _ctx: &mut RequestContext) -> Result<Flow, Halt> {
        Err(Halt::error(self.clone()))
    }
}

/// An unauthenticated JSON endpoint: access log, body-decoding dispatcher, JSON writer.
pub fn apify<F, Sig>(f: F) -> Chain
where
    F: RpcFn<Sig>,
    Sig: 'static,
{
    Chain::json(AccessLog::default(), json_rpc(f))
}

/// [`apify`] behind an authentication stage.
pub fn apify_auth<A, F, Sig>(auth: A, f: F) -> Chain
where
    A: Stage + 'static,
    F: RpcFn<Sig>,
    Sig: 'static,
{
    Chain::json_auth(auth, AccessLog::default(), json_rpc(f))
}

/// [`apify`] with a custom identity resolver for the access log.
pub fn apify_with_identity<R, F, Sig>(resolver: R, f: F) -> Chain
where
    R: IdentityResolver + 'static,
    F: RpcFn<Sig>,
    Sig: 'static,
{
    Chain::json(AccessLog::new(resolver), json_rpc(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpInfo;
    use crate::error::{ApiError, RedirectError};
    use http::{HeaderValue, StatusCode, header};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(uri: &str) -> ApiRequest {
        ApiRequest::from(Request::builder().uri(uri).body(Bytes::new()).unwrap())
    }

    async fn body_string(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Stage for Counter {
        async fn serve(&self, _ctx: &mut RequestContext) -> Result<Flow, Halt> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Next)
        }
    }

    struct Fails;

    #[async_trait]
    impl Stage for Fails {
        async fn serve(&self, _ctx: &mut RequestContext) -> Result<Flow, Halt> {
            Err(Halt::error("decode failed"))
        }
    }

    struct Panics;

    #[async_trait]
    impl Stage for Panics {
        async fn serve(&self, _ctx: &mut RequestContext) -> Result<Flow, Halt> {
            panic!("stage exploded")
        }
    }

    struct Renders(ApiError);

    #[async_trait]
    impl Stage for Renders {
        async fn serve(&self, _ctx: &mut RequestContext) -> Result<Flow, Halt> {
            Err(self.0.clone().into())
        }
    }

    #[tokio::test]
    async fn all_stages_continue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder().stage(Counter(counter.clone())).stage(Counter(counter.clone())).build();

        let response = chain.serve(request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn error_stops_the_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder().stage(Fails).stage(Counter(counter.clone())).build();

        let response = chain.serve(request("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(body_string(response).await, "Internal Server Error: decode failed");
    }

    #[tokio::test]
    async fn panic_is_caught() {
        let chain = Chain::builder().stage(Panics).stage(JsonWriter).build();

        let response = chain.serve(request("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Internal Server Error: stage exploded");
    }

    #[tokio::test]
    async fn halt_renders_like_the_responder() {
        let error = ApiError::new(17, "nope", None).with_status(400);
        let chain = Chain::builder().stage(Renders(error.clone())).stage(JsonWriter).build();

        let via_chain = chain.serve(request("/api/x?_pretty_=1")).await;
        let direct = crate::responder::Responder::response_to(&error, &request("/api/x?_pretty_=1"));

        assert_eq!(via_chain.status(), direct.status());
        assert_eq!(via_chain.headers(), direct.headers());
        assert_eq!(body_string(via_chain).await, body_string(direct).await);
    }

    #[tokio::test]
    async fn failed_construction_fires_on_request() {
        let chain = Chain::builder().try_stage(Err::<JsonWriter, _>("missing secret store")).build();
        assert_eq!(chain.len(), 1);

        let response = chain.serve(request("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Internal Server Error: missing secret store");
    }

    #[tokio::test]
    async fn apify_success_and_error() {
        async fn ping() -> Result<&'static str, ApiError> {
            Ok("pong")
        }
        async fn login() -> Result<(), RedirectError> {
            Err(RedirectError::found("/login"))
        }

        let response = apify(ping).serve(request("/api/ping")).await;
        assert_eq!(body_string(response).await, "{\"errno\":0,\"errmsg\":\"\",\"data\":\"pong\"}\n");

        let response = apify(login).serve(request("/api/me")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn sink_headers_reach_the_response() {
        async fn set_cookie(info: HttpInfo) -> Result<u32, ApiError> {
            info.sink.insert_header(header::SET_COOKIE, HeaderValue::from_static("sid=1")).await;
            info.sink.insert_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html")).await;
            Ok(1)
        }

        let response = apify(set_cookie).serve(request("/api/login")).await;
        assert_eq!(response.headers().get(header::SET_COOKIE).unwrap(), "sid=1");
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/javascript");
    }
}
