//! Decoder turning raw bytes into complete `http::Request<Bytes>` values
//!
//! The decoder runs in two phases. The header phase parses the request line and header
//! fields with `httparse` and works out how many body bytes follow. The body phase waits
//! until the whole `Content-Length` body is buffered and then emits the request.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Maximum body size: configurable, 4MB by default
//! - `Transfer-Encoding` bodies are rejected

use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::ParseError;

/// Maximum number of headers allowed in a request
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Default limit for a request body
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug)]
enum DecodeState {
    Header,
    Body { parts: Parts, length: usize },
}

/// Decoder for HTTP requests implementing the [`Decoder`] trait.
#[derive(Debug)]
pub struct RequestDecoder {
    state: DecodeState,
    max_body_bytes: usize,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_body_bytes(max_body_bytes: usize) -> Self {
        Self { state: DecodeState::Header, max_body_bytes }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::with_max_body_bytes(DEFAULT_MAX_BODY_BYTES)
    }
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match mem::replace(&mut self.state, DecodeState::Header) {
                DecodeState::Header => {
                    let Some(parts) = decode_header(src)? else {
                        return Ok(None);
                    };
                    let length = payload_length(&parts.headers)?;
                    ensure!(length <= self.max_body_bytes, ParseError::too_large_body(length, self.max_body_bytes));
                    trace!(length, "parsed request header");
                    self.state = DecodeState::Body { parts, length };
                }

                DecodeState::Body { parts, length } => {
                    if src.len() < length {
                        src.reserve(length - src.len());
                        self.state = DecodeState::Body { parts, length };
                        return Ok(None);
                    }

                    let body = src.split_to(length).freeze();
                    return Ok(Some(Request::from_parts(parts, body)));
                }
            }
        }
    }
}

fn decode_header(src: &mut BytesMut) -> Result<Option<Parts>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut req = httparse::Request::new(&mut headers);

    let status = req.parse(src).map_err(|e| match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e),
    })?;

    let body_offset = match status {
        Status::Complete(body_offset) => body_offset,
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }
    };
    ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return Err(ParseError::InvalidVersion(v)),
    };
    let method = req.method.ok_or(ParseError::InvalidMethod)?;
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
    let uri = req.path.ok_or(ParseError::InvalidUri)?;
    let uri = Uri::try_from(uri).map_err(|_| ParseError::InvalidUri)?;

    let mut header_map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
        header_map.append(name, value);
    }

    let (mut parts, ()) = Request::new(()).into_parts();
    parts.method = method;
    parts.uri = uri;
    parts.version = version;
    parts.headers = header_map;

    src.advance(body_offset);
    Ok(Some(parts))
}

/// Works out the body length from the `Content-Length` header.
///
/// Requests without a body header carry an empty body; any `Transfer-Encoding` is refused.
fn payload_length(headers: &HeaderMap) -> Result<usize, ParseError> {
    if let Some(te_value) = headers.get(http::header::TRANSFER_ENCODING) {
        return Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(te_value.as_bytes())));
    }

    match headers.get(http::header::CONTENT_LENGTH) {
        None => Ok(0),
        Some(cl_value) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
            cl_str.trim().parse::<usize>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not usize")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(raw: &str) -> BytesMut {
        BytesMut::from(raw.replace('\n', "\r\n").as_str())
    }

    #[test]
    fn from_curl() {
        let mut buf = crlf(indoc! {r##"
        GET /api/echo?foo=42&bar=hi HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##});

        let request = RequestDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.uri().path(), "/api/echo");
        assert_eq!(request.uri().query(), Some("foo=42&bar=hi"));
        assert_eq!(request.headers().len(), 3);
        assert_eq!(request.headers().get(http::header::USER_AGENT).unwrap(), "curl/7.79.1");
        assert!(request.body().is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn body_waits_for_content_length() {
        let mut decoder = RequestDecoder::new();
        let mut buf = crlf(indoc! {r##"
        POST /api/sum HTTP/1.1
        Content-Type: application/json
        Content-Length: 14

        {"xs":"##});

        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"[1,2,3]}");
        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.body().as_ref(), br#"{"xs":[1,2,3]}"#);
    }

    #[test]
    fn pipelined_requests() {
        let mut decoder = RequestDecoder::new();
        let mut buf = crlf(indoc! {r##"
        POST /a HTTP/1.1
        Content-Length: 3

        abcGET /b HTTP/1.1

        "##});

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.uri().path(), "/a");
        assert_eq!(first.body().as_ref(), b"abc");

        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.uri().path(), "/b");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_header() {
        let mut buf = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: 127.0");
        assert!(RequestDecoder::new().decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn reject_chunked() {
        let mut buf = crlf(indoc! {r##"
        POST /upload HTTP/1.1
        Transfer-Encoding: chunked

        "##});

        let result = RequestDecoder::new().decode(&mut buf);
        assert!(matches!(result, Err(ParseError::UnsupportedTransferEncoding { .. })));
    }

    #[test]
    fn reject_invalid_content_length() {
        let mut buf = crlf(indoc! {r##"
        POST /upload HTTP/1.1
        Content-Length: abc

        "##});

        let result = RequestDecoder::new().decode(&mut buf);
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn reject_large_body() {
        let mut buf = crlf(indoc! {r##"
        POST /upload HTTP/1.1
        Content-Length: 1024

        "##});

        let result = RequestDecoder::with_max_body_bytes(16).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeBody { current_size: 1024, max_size: 16 })));
    }

    #[test]
    fn reject_large_header() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nX-Long: ");
        buf.extend_from_slice(&[b'a'; MAX_HEADER_BYTES]);

        let result = RequestDecoder::new().decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }
}
