//! The shapes of handler function a dispatcher accepts
//!
//! A handler function takes zero, one or two inputs and returns `Result<T, E>`:
//!
//! | signature                          | marker                                   |
//! |------------------------------------|------------------------------------------|
//! | `async fn f() -> ..`               | `()`                                     |
//! | `async fn f(req: R) -> ..`         | `(WithRequest<R>,)`                      |
//! | `async fn f(arg: A) -> ..`         | `(WithArg<A>,)`                          |
//! | `async fn f(arg: A, req: R) -> ..` | `(WithArg<A>, WithRequest<R>)`           |
//!
//! `R` is [`ApiRequest`] or [`HttpInfo`], `A` is any `DeserializeOwned` type (a `Box<A>`
//! works too and the function receives the box). The marker is inferred, so callers only
//! write `json_rpc(my_fn)`.
//!
//! for example, the `(WithArg<A>,)` shape expands to:
//!```ignore
//! impl<Func, Fut, A, T, E> RpcFn<(WithArg<A>,)> for Func
//! where
//!     Func: Fn(A) -> Fut + Send + Sync + 'static,
//!     Fut: Future<Output = Result<T, E>> + Send + 'static,
//!     A: DeserializeOwned + Send + 'static,
//! {
//!     async fn invoke<D: Decoding>(&self, request: &ApiRequest, sink: &ResponseSink) -> Result<T, Halt> {
//!         let arg = D::decode::<A>(request)?;
//!         (self)(arg).await.map_err(Into::into)
//!     }
//! }
//!```

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::context::{HttpInfo, ResponseSink};
use crate::error::Halt;
use crate::extract::Decoding;
use crate::request::ApiRequest;
use crate::result::IntoApiResult;

/// Marks the decoded argument of a handler function.
#[derive(Debug)]
pub struct WithArg<A>(PhantomData<fn() -> A>);

/// Marks the trailing request input of a handler function.
#[derive(Debug)]
pub struct WithRequest<R>(PhantomData<fn() -> R>);

/// The request side inputs a handler function may take last.
pub trait RequestShape: Send + 'static {
    fn extract(request: &ApiRequest, sink: &ResponseSink) -> Self;
}

impl RequestShape for ApiRequest {
    fn extract(request: &ApiRequest, _sink: &ResponseSink) -> Self {
        request.clone()
    }
}

impl RequestShape for HttpInfo {
    fn extract(request: &ApiRequest, sink: &ResponseSink) -> Self {
        HttpInfo { sink: sink.clone(), request: request.clone() }
    }
}

/// A handler function adapted to one of the supported shapes.
#[async_trait]
pub trait RpcFn<Sig>: Send + Sync + 'static {
    type Output: IntoApiResult + Send;

    async fn invoke<D: Decoding>(&self, request: &ApiRequest, sink: &ResponseSink) -> Result<Self::Output, Halt>;
}

#[async_trait]
impl<Func, Fut, T, E> RpcFn<()> for Func
where
    Func: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: IntoApiResult + Send,
    E: Into<Halt>,
{
    type Output = T;

    async fn invoke<D: Decoding>(&self, _request: &ApiRequest, _sink: &ResponseSink) -> Result<T, Halt> {
        (self)().await.map_err(Into::into)
    }
}

#[async_trait]
impl<Func, Fut, T, E, R> RpcFn<(WithRequest<R>,)> for Func
where
    Func: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: IntoApiResult + Send,
    E: Into<Halt>,
    R: RequestShape,
{
    type Output = T;

    async fn invoke<D: Decoding>(&self, request: &ApiRequest, sink: &ResponseSink) -> Result<T, Halt> {
        let req = R::extract(request, sink);
        (self)(req).await.map_err(Into::into)
    }
}

#[async_trait]
impl<Func, Fut, T, E, A> RpcFn<(WithArg<A>,)> for Func
where
    Func: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: IntoApiResult + Send,
    E: Into<Halt>,
    A: DeserializeOwned + Send + 'static,
{
    type Output = T;

    async fn invoke<D: Decoding>(&self, request: &ApiRequest, _sink: &ResponseSink) -> Result<T, Halt> {
        let arg = D::decode::<A>(request)?;
        (self)(arg).await.map_err(Into::into)
    }
}

#[async_trait]
impl<Func, Fut, T, E, A, R> RpcFn<(WithArg<A>, WithRequest<R>)> for Func
where
    Func: Fn(A, R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: IntoApiResult + Send,
    E: Into<Halt>,
    A: DeserializeOwned + Send + 'static,
    R: RequestShape,
{
    type Output = T;

    async fn invoke<D: Decoding>(&self, request: &ApiRequest, sink: &ResponseSink) -> Result<T, Halt> {
        let arg = D::decode::<A>(request)?;
        let req = R::extract(request, sink);
        (self)(arg, req).await.map_err(Into::into)
    }
}
