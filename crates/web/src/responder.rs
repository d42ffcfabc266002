//! Values that know how to answer a request.
//!
//! The [`Responder`] trait is implemented by the self-rendering errors of this crate. A stage
//! returning `Halt::Render(responder)` ends the chain with whatever the responder renders.

use std::fmt;

use http::{HeaderValue, Response, StatusCode, header};
use tracing::error;

use crate::body::ResponseBody;
use crate::error::{ApiError, ApiReply, Forbidden, RedirectError};
use crate::json::write_json;
use crate::request::ApiRequest;

pub trait Responder: fmt::Debug + Send + Sync {
    fn response_to(&self, req: &ApiRequest) -> Response<ResponseBody>;
}

impl Responder for ApiError {
    fn response_to(&self, req: &ApiRequest) -> Response<ResponseBody> {
        let reply = ApiReply { errno: self.code, errmsg: &self.message, data: self.payload.as_ref() };
        match write_json(req, &reply, Some(self.status())) {
            Ok(response) => response,
            Err(e) => {
                error!(cause = %e, "can't render api error");
                internal_error(&e.to_string())
            }
        }
    }
}

impl Responder for RedirectError {
    fn response_to(&self, _req: &ApiRequest) -> Response<ResponseBody> {
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::FOUND);
        match HeaderValue::try_from(self.location.as_str()) {
            Ok(location) => {
                response.headers_mut().insert(header::LOCATION, location);
            }
            Err(e) => error!(location = %self.location, cause = %e, "invalid redirect location"),
        }
        response
    }
}

impl Responder for Forbidden {
    fn response_to(&self, _req: &ApiRequest) -> Response<ResponseBody> {
        plain_text(StatusCode::FORBIDDEN, self.message.clone())
    }
}

/// The generic `500` answer: `Internal Server Error: <message>` as plain text.
pub fn internal_error(message: &str) -> Response<ResponseBody> {
    plain_text(StatusCode::INTERNAL_SERVER_ERROR, format!("Internal Server Error: {message}"))
}

fn plain_text(status: StatusCode, body: String) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
