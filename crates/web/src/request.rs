//! The request as seen by chain stages and handler functions.
//!
//! [`ApiRequest`] is a cheap, cloneable handle over the buffered request. Its form (query
//! string plus url-encoded body) is parsed once, on first use.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use apify_http::protocol::RemoteAddr;
use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Request, Uri, Version, header};
use once_cell::sync::OnceCell;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    parts: Parts,
    body: Bytes,
    form: OnceCell<Form>,
}

impl From<Request<Bytes>> for ApiRequest {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self { inner: Arc::new(Inner { parts, body, form: OnceCell::new() }) }
    }
}

impl ApiRequest {
    pub fn new(request: Request<Bytes>) -> Self {
        Self::from(request)
    }

    pub fn method(&self) -> &Method {
        &self.inner.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.parts.uri
    }

    pub fn version(&self) -> Version {
        self.inner.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.parts.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.inner.parts.extensions
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    /// Path and query, the way it appeared on the request line.
    pub fn request_uri(&self) -> &str {
        self.uri().path_and_query().map_or_else(|| self.uri().path(), |pq| pq.as_str())
    }

    /// The peer address recorded by the transport, if any.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.extensions().get::<RemoteAddr>().map(|addr| addr.0)
    }

    /// The parsed form, body values first and query values after.
    pub fn form(&self) -> &Form {
        self.inner.form.get_or_init(|| Form::parse(&self.inner.parts, &self.inner.body))
    }

    /// First form value for `key`, or `""` when absent.
    pub fn form_value(&self, key: &str) -> &str {
        self.form().get(key).unwrap_or("")
    }
}

/// Url-encoded parameters of a request, in arrival order, repeats kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    fn parse(parts: &Parts, body: &Bytes) -> Self {
        let mut pairs = Vec::new();
        if has_form_body(parts) {
            pairs.extend(parse_pairs(body));
        }
        if let Some(query) = parts.uri.query() {
            pairs.extend(parse_pairs(query.as_bytes()));
        }
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// One value per key, the first one seen, ordered by key.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for (k, v) in self.iter() {
            flat.entry(k.to_string()).or_insert_with(|| v.to_string());
        }
        flat
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Form {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

fn has_form_body(parts: &Parts) -> bool {
    if !matches!(parts.method, Method::POST | Method::PUT | Method::PATCH) {
        return false;
    }
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|content_type| content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
}

fn parse_pairs(bytes: &[u8]) -> Vec<(String, String)> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes).unwrap_or_else(|e| {
        warn!(cause = %e, "can't parse url-encoded form");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> ApiRequest {
        ApiRequest::from(Request::builder().uri(uri).body(Bytes::new()).unwrap())
    }

    #[test]
    fn query_form() {
        let request = get("/api/echo?foo=42&bar=hi&foo=43");

        assert_eq!(request.form_value("foo"), "42");
        assert_eq!(request.form_value("bar"), "hi");
        assert_eq!(request.form_value("missing"), "");
        assert_eq!(request.form().iter().collect::<Vec<_>>(), vec![("foo", "42"), ("bar", "hi"), ("foo", "43")]);
        assert_eq!(request.request_uri(), "/api/echo?foo=42&bar=hi&foo=43");
    }

    #[test]
    fn body_values_come_first() {
        let request = ApiRequest::from(
            Request::builder()
                .method(Method::POST)
                .uri("/api/echo?foo=1&bar=query")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                .body(Bytes::from_static(b"foo=2&baz=%E4%BD%A0"))
                .unwrap(),
        );

        assert_eq!(request.form_value("foo"), "2");
        assert_eq!(request.form_value("bar"), "query");
        assert_eq!(request.form_value("baz"), "你");
        assert_eq!(request.form().iter().count(), 4);
    }

    #[test]
    fn json_body_is_not_a_form() {
        let request = ApiRequest::from(
            Request::builder()
                .method(Method::POST)
                .uri("/api/sum")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Bytes::from_static(br#"{"xs":[1]}"#))
                .unwrap(),
        );

        assert!(request.form().is_empty());
    }

    #[test]
    fn flatten_keeps_first_value() {
        let form: Form = [("b", "2"), ("a", "1"), ("b", "3")].into_iter().collect();
        let flat = form.flatten();

        assert_eq!(flat.len(), 2);
        assert_eq!(flat.get("a").map(String::as_str), Some("1"));
        assert_eq!(flat.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn remote_addr_from_extension() {
        let addr: SocketAddr = "192.168.1.9:4000".parse().unwrap();
        let mut request = Request::builder().uri("/").body(Bytes::new()).unwrap();
        request.extensions_mut().insert(RemoteAddr(addr));

        assert_eq!(ApiRequest::from(request).remote_addr(), Some(addr));
        assert_eq!(get("/").remote_addr(), None);
    }
}
