//! JSON / JSONP rendering shared by successful replies and [`ApiError`](crate::ApiError).
//!
//! Reserved form parameters:
//!
//! - `_pretty_`: non-empty selects two-space indented JSON
//! - `callback`: non-empty wraps every record as `<callback>(\n<json>\n)`
//! - `cache`: copied verbatim into `Cache-Control`, only on the success path
//!
//! Bodies whose JSON exceeds [`GZIP_MIN_LENGTH`] bytes are gzip-compressed for clients that
//! accept it.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Response, StatusCode, header};
use serde::Serialize;
use tracing::{trace, warn};

use crate::body::ResponseBody;
use crate::chain::{Flow, Stage};
use crate::encoding::{accepts_gzip, gzip};
use crate::error::{ApiReply, Halt};
use crate::context::RequestContext;
use crate::request::ApiRequest;
use crate::result::{ApiResult, ApiStream, JsonValue};

/// Bodies up to this many bytes of JSON are never compressed.
pub const GZIP_MIN_LENGTH: usize = 2048;

const APPLICATION_JAVASCRIPT: HeaderValue = HeaderValue::from_static("application/javascript");
const GZIP: HeaderValue = HeaderValue::from_static("gzip");

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T, pretty: bool) -> serde_json::Result<Vec<u8>> {
    if pretty { serde_json::to_vec_pretty(value) } else { serde_json::to_vec(value) }
}

/// Renders `value` as one JSON record.
///
/// `status` is `None` on the success path: the response is `200 OK` and the `cache`
/// parameter is honored. With `Some(status)` the response carries that status and no
/// `Cache-Control`.
pub fn write_json<T: Serialize + ?Sized>(
    req: &ApiRequest,
    value: &T,
    status: Option<StatusCode>,
) -> Result<Response<ResponseBody>, Halt> {
    let mut output = JsonOutput::new(req);
    let json = encode(value, output.pretty)?;
    output.push_record(&json);
    output.into_response(req, status)
}

/// Buffers framed JSON records and turns them into a response.
struct JsonOutput<'r> {
    pretty: bool,
    callback: &'r str,
    body: BytesMut,
    json_length: usize,
}

impl<'r> JsonOutput<'r> {
    fn new(req: &'r ApiRequest) -> Self {
        Self { pretty: !req.form_value("_pretty_").is_empty(), callback: req.form_value("callback"), body: BytesMut::new(), json_length: 0 }
    }

    fn push_record(&mut self, json: &[u8]) {
        self.json_length += json.len();
        if self.callback.is_empty() {
            self.body.reserve(json.len() + 1);
            self.body.put_slice(json);
            self.body.put_u8(b'\n');
        } else {
            self.body.reserve(self.callback.len() + json.len() + 4);
            self.body.put_slice(self.callback.as_bytes());
            self.body.put_slice(b"(\n");
            self.body.put_slice(json);
            self.body.put_slice(b"\n)");
        }
    }

    fn into_response(self, req: &ApiRequest, status: Option<StatusCode>) -> Result<Response<ResponseBody>, Halt> {
        let mut response = Response::new(ResponseBody::empty());
        let headers = response.headers_mut();

        if status.is_none() {
            let cache = req.form_value("cache");
            if !cache.is_empty() {
                match HeaderValue::from_str(cache) {
                    Ok(value) => {
                        headers.insert(header::CACHE_CONTROL, value);
                    }
                    Err(e) => warn!(target: "rest::json", cache, cause = %e, "ignore invalid cache parameter"),
                }
            }
        }

        headers.insert(header::CONTENT_TYPE, APPLICATION_JAVASCRIPT);

        let body = if self.json_length > GZIP_MIN_LENGTH && accepts_gzip(req.headers()) {
            trace!(target: "rest::json", json_length = self.json_length, "gzip json response");
            headers.insert(header::VARY, HeaderValue::from_static("Content-Encoding"));
            headers.insert(header::CONTENT_ENCODING, GZIP);
            gzip(&self.body)?
        } else {
            self.body.freeze()
        };

        *response.status_mut() = status.unwrap_or(StatusCode::OK);
        *response.body_mut() = ResponseBody::once(body);
        Ok(response)
    }
}

fn write_reply(req: &ApiRequest, value: &dyn JsonValue) -> Result<Response<ResponseBody>, Halt> {
    let mut output = JsonOutput::new(req);
    let json = value.to_reply_json(output.pretty)?;
    output.push_record(&json);
    output.into_response(req, None)
}

fn write_stream(req: &ApiRequest, stream: ApiStream) -> Result<Response<ResponseBody>, Halt> {
    let mut output = JsonOutput::new(req);
    for item in stream {
        let json = item.to_json(output.pretty)?;
        output.push_record(&json);
    }
    output.into_response(req, None)
}

/// The terminal stage: renders whatever the dispatcher left in the result slot.
///
/// A plain value is wrapped in a success [`ApiReply`]; a stream is written record by record;
/// an empty slot renders `{"errno":0,"errmsg":""}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonWriter;

#[async_trait]
impl Stage for JsonWriter {
    async fn serve(&self, ctx: &mut RequestContext) -> Result<Flow, Halt> {
        let response = match ctx.take_result() {
            Some(ApiResult::Value(value)) => write_reply(ctx.request(), value.as_ref())?,
            Some(ApiResult::Stream(stream)) => write_stream(ctx.request(), stream)?,
            None => write_json(ctx.request(), &ApiReply::<()>::ok(None), None)?,
        };
        Ok(Flow::Respond(response))
    }
}
