//! Per-request state threaded through a [`Chain`](crate::Chain).

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::{Extensions, HeaderMap};
use tokio::sync::Mutex;

use crate::request::ApiRequest;
use crate::result::ApiResult;

/// Headers staged for the response before the response itself exists.
///
/// The chain copies them onto the final response for every name the response did not set
/// on its own.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().await.insert(name, value);
    }

    pub async fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().await.append(name, value);
    }

    pub async fn headers(&self) -> HeaderMap {
        self.headers.lock().await.clone()
    }

    pub(crate) async fn merge_into(&self, target: &mut HeaderMap) {
        let staged = std::mem::take(&mut *self.headers.lock().await);
        let mut current = None;
        for (name, value) in staged {
            if let Some(name) = name {
                current = (!target.contains_key(&name)).then_some(name);
            }
            if let Some(name) = &current {
                target.append(name.clone(), value);
            }
        }
    }
}

/// The sink and request pair a handler function may ask for.
#[derive(Debug, Clone)]
pub struct HttpInfo {
    pub sink: ResponseSink,
    pub request: ApiRequest,
}

/// State owned by one chain invocation.
#[derive(Debug)]
pub struct RequestContext {
    request: ApiRequest,
    sink: ResponseSink,
    extensions: Extensions,
    result: Option<ApiResult>,
}

impl RequestContext {
    pub fn new(request: ApiRequest) -> Self {
        Self { request, sink: ResponseSink::new(), extensions: Extensions::new(), result: None }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    pub fn sink(&self) -> &ResponseSink {
        &self.sink
    }

    pub fn http_info(&self) -> HttpInfo {
        HttpInfo { sink: self.sink.clone(), request: self.request.clone() }
    }

    /// Values stages attach for later stages, e.g. a resolved user.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn set_result(&mut self, result: ApiResult) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&ApiResult> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<ApiResult> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Request, header};

    #[tokio::test]
    async fn merge_keeps_response_headers() {
        let sink = ResponseSink::new();
        sink.append_header(header::SET_COOKIE, HeaderValue::from_static("a=1")).await;
        sink.append_header(header::SET_COOKIE, HeaderValue::from_static("b=2")).await;
        sink.insert_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html")).await;

        let mut target = HeaderMap::new();
        target.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/javascript"));
        sink.merge_into(&mut target).await;

        assert_eq!(target.get(header::CONTENT_TYPE).unwrap(), "application/javascript");
        let cookies: Vec<_> = target.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert!(sink.headers().await.is_empty());
    }

    #[test]
    fn result_slot() {
        let request = ApiRequest::from(Request::builder().uri("/").body(Bytes::new()).unwrap());
        let mut ctx = RequestContext::new(request);
        assert!(ctx.result().is_none());

        ctx.set_result(crate::result::IntoApiResult::into_api_result(1));
        assert!(ctx.result().is_some());
        assert!(ctx.take_result().is_some());
        assert!(ctx.result().is_none());
    }
}
