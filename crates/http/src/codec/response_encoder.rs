//! Encoder serializing a buffered `http::Response<Bytes>` into HTTP/1.1 bytes.
//!
//! The status line is always written as `HTTP/1.1`, and `Content-Length` is always
//! replaced with the real body length.

use std::io;
use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderValue, Response, header};
use tokio_util::codec::Encoder;

use crate::protocol::SendError;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Response<Bytes>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Response<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut parts, body) = item.into_parts();

        dst.reserve(INIT_HEADER_SIZE + body.len());
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", parts.status.as_str(), parts.status.canonical_reason().unwrap_or(""))?;

        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        for (header_name, header_value) in &parts.headers {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&body);
        Ok(())
    }
}

/// Writes formatted output straight into the reserved `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn encode_with_body() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/javascript")
            .body(Bytes::from_static(b"{\"errno\":0,\"errmsg\":\"\"}\n"))
            .unwrap();

        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(response, &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: application/javascript\r\n"));
        assert!(text.contains("content-length: 24\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"errno\":0,\"errmsg\":\"\"}\n"));
    }

    #[test]
    fn encode_overrides_content_length() {
        let response = Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, "/login")
            .header(header::CONTENT_LENGTH, "99")
            .body(Bytes::new())
            .unwrap();

        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(response, &mut dst).unwrap();

        let text = std::str::from_utf8(&dst).unwrap();
        assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(text.contains("location: /login\r\n"));
        assert!(text.contains("content-length: 0\r\n"));
        assert!(!text.contains("99"));
    }
}
