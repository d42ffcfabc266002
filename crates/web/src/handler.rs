//! The dispatcher stage: decodes the argument, calls the handler function and stores its
//! output in the result slot.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::info;

use crate::chain::{Flow, Stage};
use crate::context::RequestContext;
use crate::error::Halt;
use crate::extract::{Decoding, FormDecoding, JsonDecoding};
use crate::fn_trait::RpcFn;
use crate::result::IntoApiResult;

/// a [`RpcFn`] holder bound to one decoding strategy
pub struct Dispatcher<F, Sig, D> {
    f: F,
    _phantom: PhantomData<fn(Sig, D)>,
}

impl<F, Sig, D> Dispatcher<F, Sig, D>
where
    F: RpcFn<Sig>,
    D: Decoding,
{
    pub fn new(f: F) -> Self {
        Self { f, _phantom: PhantomData }
    }
}

impl<F, Sig, D> fmt::Debug for Dispatcher<F, Sig, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("fn", &std::any::type_name::<F>()).finish()
    }
}

/// A dispatcher reading its argument from the form.
///
/// Fields map to form keys by their serde name and a repeated key fills a `Vec` field. A field
/// whose key is missing from the request fails the decode, answered `500`, unless it is an
/// `Option` or marked `#[serde(default)]`.
pub fn schema_rpc<F, Sig>(f: F) -> Dispatcher<F, Sig, FormDecoding>
where
    F: RpcFn<Sig>,
{
    Dispatcher::new(f)
}

/// A dispatcher reading its argument from a JSON body.
pub fn json_rpc<F, Sig>(f: F) -> Dispatcher<F, Sig, JsonDecoding>
where
    F: RpcFn<Sig>,
{
    Dispatcher::new(f)
}

#[async_trait]
impl<F, Sig, D> Stage for Dispatcher<F, Sig, D>
where
    F: RpcFn<Sig>,
    Sig: 'static,
    D: Decoding,
{
    async fn serve(&self, ctx: &mut RequestContext) -> Result<Flow, Halt> {
        let outcome = self.f.invoke::<D>(ctx.request(), ctx.sink()).await;
        let url = ctx.request().request_uri();
        match outcome {
            Ok(output) => {
                info!(target: "rest::rpc", url, "req end");
                ctx.set_result(output.into_api_result());
                Ok(Flow::Next)
            }
            Err(halt) => {
                info!(target: "rest::rpc", url, err = %halt, "req end");
                Err(halt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpInfo;
    use crate::error::{ApiError, Forbidden};
    use crate::request::ApiRequest;
    use crate::result::{ApiResult, ApiStream};
    use bytes::Bytes;
    use http::{Method, Request};
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize)]
    struct EchoParams {
        #[serde(rename = "foo")]
        foo: i32,
        #[serde(rename = "bar")]
        bar: String,
    }

    #[derive(Serialize)]
    struct Echoed {
        #[serde(rename = "Got")]
        got: String,
    }

    async fn echo(p: EchoParams) -> Result<Echoed, ApiError> {
        Ok(Echoed { got: format!("{}/{}", p.foo, p.bar) })
    }

    async fn whoami(p: Box<EchoParams>, info: HttpInfo) -> Result<String, Forbidden> {
        if p.foo < 0 {
            return Err(Forbidden::new("negative"));
        }
        Ok(format!("{} {}", info.request.method(), p.bar))
    }

    async fn count(req: ApiRequest) -> Result<ApiStream, ApiError> {
        let n: usize = req.form_value("n").parse().unwrap_or(0);
        Ok(ApiStream::new(0..n))
    }

    fn get(uri: &str) -> RequestContext {
        RequestContext::new(ApiRequest::from(Request::builder().uri(uri).body(Bytes::new()).unwrap()))
    }

    fn reply_json(ctx: &RequestContext) -> String {
        match ctx.result() {
            Some(ApiResult::Value(value)) => String::from_utf8(value.to_reply_json(false).unwrap()).unwrap(),
            other => panic!("expect value result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schema_dispatch_stores_the_output() {
        let mut ctx = get("/api/echo?foo=42&bar=hi");
        let flow = schema_rpc(echo).serve(&mut ctx).await.unwrap();

        assert!(matches!(flow, Flow::Next));
        assert_eq!(reply_json(&ctx), r#"{"errno":0,"errmsg":"","data":{"Got":"42/hi"}}"#);
    }

    #[tokio::test]
    async fn decode_error_halts() {
        let mut ctx = get("/api/echo?foo=x&bar=hi");
        let halt = schema_rpc(echo).serve(&mut ctx).await.unwrap_err();

        assert!(matches!(halt, Halt::Error(_)));
        assert!(ctx.result().is_none());
    }

    #[tokio::test]
    async fn missing_form_field_halts() {
        let mut ctx = get("/api/echo?foo=42");
        let halt = schema_rpc(echo).serve(&mut ctx).await.unwrap_err();

        assert!(halt.to_string().contains("missing field `bar`"), "{halt}");
        assert!(ctx.result().is_none());
    }

    #[tokio::test]
    async fn json_dispatch_with_info() {
        let req = Request::builder().method(Method::POST).uri("/api/me").body(Bytes::from_static(br#"{"foo":1,"bar":"x"}"#)).unwrap();
        let mut ctx = RequestContext::new(ApiRequest::from(req));
        json_rpc(whoami).serve(&mut ctx).await.unwrap();
        assert_eq!(reply_json(&ctx), r#"{"errno":0,"errmsg":"","data":"POST x"}"#);

        let req = Request::builder().method(Method::POST).uri("/api/me").body(Bytes::from_static(br#"{"foo":-1,"bar":"x"}"#)).unwrap();
        let mut ctx = RequestContext::new(ApiRequest::from(req));
        let halt = json_rpc(whoami).serve(&mut ctx).await.unwrap_err();
        assert!(matches!(halt, Halt::Render(_)));
    }

    #[tokio::test]
    async fn stream_output() {
        let mut ctx = get("/api/count?n=3");
        schema_rpc(count).serve(&mut ctx).await.unwrap();

        let Some(ApiResult::Stream(stream)) = ctx.take_result() else {
            panic!("expect stream result");
        };
        assert_eq!(stream.count(), 3);
    }
}
