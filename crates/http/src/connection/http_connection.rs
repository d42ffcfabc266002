use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::CONNECTION;
use http::{Request, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::{BoxError, Handler};
use crate::protocol::{HttpError, RemoteAddr, SendError};

/// An HTTP connection that reads requests, dispatches them and writes the responses back
///
/// Requests on one connection are served one after another. The connection stays open
/// while the client keeps it alive and is closed after the first request that asks for
/// `Connection: close` (or an HTTP/1.0 request without `Connection: keep-alive`).
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    remote_addr: Option<SocketAddr>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_decoder(reader, writer, RequestDecoder::new())
    }

    pub fn with_decoder(reader: R, writer: W, decoder: RequestDecoder) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, 8 * 1024),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            remote_addr: None,
        }
    }

    /// Attaches the peer address; every request then carries a [`RemoteAddr`] extension.
    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(mut request)) => {
                    let keep_alive = is_keep_alive(&request);
                    if let Some(remote_addr) = self.remote_addr {
                        request.extensions_mut().insert(RemoteAddr(remote_addr));
                    }

                    let response_result = handler.call(request).await;
                    self.send_response(response_result).await?;

                    if !keep_alive {
                        info!("client asked to close, connection shutdown");
                        return Ok(());
                    }
                }

                Some(Err(e)) => {
                    error!("can't receive next request, cause {}", e);
                    self.do_send_response(build_error_response(StatusCode::BAD_REQUEST)).await?;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn send_response<T, E>(&mut self, response_result: Result<Response<T>, E>) -> Result<(), HttpError>
    where
        T: Body<Data = Bytes>,
        T::Error: Display,
        E: Into<BoxError>,
    {
        let response = match response_result {
            Ok(response) => response,
            Err(e) => {
                error!("handle response error, cause: {}", e.into());
                return self.do_send_response(build_error_response(StatusCode::INTERNAL_SERVER_ERROR)).await;
            }
        };

        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(|e| SendError::invalid_body(format!("resolve response body error: {e}")))?;
        self.do_send_response(Response::from_parts(parts, body.to_bytes())).await
    }

    async fn do_send_response(&mut self, response: Response<Bytes>) -> Result<(), HttpError> {
        self.framed_write.send(response).await?;
        Ok(())
    }
}

fn is_keep_alive<B>(request: &Request<B>) -> bool {
    let connection = request.headers().get(CONNECTION).and_then(|value| value.to_str().ok()).map(str::to_ascii_lowercase);
    match (request.version(), connection.as_deref()) {
        (_, Some("close")) => false,
        (Version::HTTP_10, Some("keep-alive")) => true,
        (Version::HTTP_10, _) => false,
        _ => true,
    }
}

fn build_error_response(status_code: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status_code;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use http_body_util::Full;
    use indoc::indoc;
    use std::convert::Infallible;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn echo_path(request: Request<Bytes>) -> Result<Response<Full<Bytes>>, Infallible> {
        let remote = request.extensions().get::<RemoteAddr>().map(|addr| addr.0.to_string()).unwrap_or_default();
        let text = format!("{}|{}|{}", request.uri().path(), request.body().len(), remote);
        Ok(Response::new(Full::new(Bytes::from(text))))
    }

    async fn run(raw: &str, remote_addr: Option<SocketAddr>) -> String {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let handler = Arc::new(make_handler(echo_path));

        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server);
            let mut connection = HttpConnection::new(reader, writer);
            if let Some(addr) = remote_addr {
                connection = connection.with_remote_addr(addr);
            }
            connection.process(handler).await
        });

        client.write_all(raw.replace('\n', "\r\n").as_bytes()).await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        let _ = task.await.unwrap();
        output
    }

    #[tokio::test]
    async fn serve_then_close() {
        let raw = indoc! {r##"
        POST /api/sum HTTP/1.1
        Content-Length: 5
        Connection: close

        hello"##};

        let addr: SocketAddr = "10.0.0.7:5123".parse().unwrap();
        let output = run(raw, Some(addr)).await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.ends_with("/api/sum|5|10.0.0.7:5123"));
    }

    #[tokio::test]
    async fn keep_alive_serves_each_request() {
        let raw = indoc! {r##"
        GET /first HTTP/1.1

        GET /second HTTP/1.1
        Connection: close

        "##};

        let output = run(raw, None).await;

        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(output.contains("/first|0|"));
        assert!(output.ends_with("/second|0|"));
    }

    #[tokio::test]
    async fn bad_request_on_parse_error() {
        let raw = indoc! {r##"
        POST /upload HTTP/1.1
        Transfer-Encoding: chunked

        "##};

        let output = run(raw, None).await;
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn keep_alive_rules() {
        let request = Request::builder().version(Version::HTTP_11).body(()).unwrap();
        assert!(is_keep_alive(&request));

        let request = Request::builder().version(Version::HTTP_11).header(CONNECTION, "Close").body(()).unwrap();
        assert!(!is_keep_alive(&request));

        let request = Request::builder().version(Version::HTTP_10).body(()).unwrap();
        assert!(!is_keep_alive(&request));

        let request = Request::builder().version(Version::HTTP_10).header(CONNECTION, "keep-alive").body(()).unwrap();
        assert!(is_keep_alive(&request));
    }
}
