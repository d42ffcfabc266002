//! The request handler seam between the transport and the application.
//!
//! A [`Handler`] receives a fully buffered `Request<Bytes>` and returns a response whose
//! body implements [`http_body::Body`]. Plain async functions become handlers through
//! [`make_handler`].

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;

pub type BoxError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    type RespBody: Body<Data = Bytes> + Send;
    type Error: Into<BoxError> + Send;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Body<Data = Bytes> + Send,
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Err: Into<BoxError> + Send,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<Bytes>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body<Data = Bytes>,
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<Bytes>) -> Ret,
{
    HandlerFn { f }
}
