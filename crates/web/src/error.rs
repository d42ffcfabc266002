//! Errors that render themselves, and the value stages return to stop a chain.

use std::fmt;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::extract::DecodeError;
use crate::responder::Responder;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The wire envelope: `{"errno":..,"errmsg":..,"data":..}`, `data` left out when absent.
#[derive(Debug, Serialize)]
pub struct ApiReply<'a, T: ?Sized> {
    pub errno: i32,
    pub errmsg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a T>,
}

impl<'a, T: ?Sized> ApiReply<'a, T> {
    pub fn ok(data: Option<&'a T>) -> Self {
        Self { errno: 0, errmsg: "", data }
    }
}

/// An application failure rendered as an [`ApiReply`].
///
/// A `status_code` of `0` renders as `502 Bad Gateway`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("api error {code}: {message}")]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    pub payload: Option<Value>,
    pub status_code: u16,
}

impl ApiError {
    /// Builds an error answered with HTTP 200; use [`ApiError::with_status`] for another code.
    pub fn new(code: i32, message: impl Into<String>, payload: Option<Value>) -> Self {
        Self { code, message: message.into(), payload, status_code: 200 }
    }

    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.status_code {
            0 => StatusCode::BAD_GATEWAY,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("redirect {status_code} to {location}")]
pub struct RedirectError {
    pub status_code: u16,
    pub location: String,
}

impl RedirectError {
    pub fn new(status_code: u16, location: impl Into<String>) -> Self {
        Self { status_code, location: location.into() }
    }

    /// A `302 Found` redirect.
    pub fn found(location: impl Into<String>) -> Self {
        Self::new(StatusCode::FOUND.as_u16(), location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("forbidden: {message}")]
pub struct Forbidden {
    pub message: String,
}

impl Forbidden {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Why a stage stopped the chain.
///
/// `Render` carries a value that knows how to answer the request itself; `Error` becomes a
/// plain-text `500 Internal Server Error`.
pub enum Halt {
    Render(Box<dyn Responder>),
    Error(BoxError),
}

impl Halt {
    pub fn render<R: Responder + 'static>(responder: R) -> Self {
        Self::Render(Box::new(responder))
    }

    pub fn error<E: Into<BoxError>>(error: E) -> Self {
        Self::Error(error.into())
    }
}

impl fmt::Debug for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(responder) => f.debug_tuple("Render").field(responder).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(responder) => write!(f, "{responder:?}"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

impl From<ApiError> for Halt {
    fn from(e: ApiError) -> Self {
        Self::render(e)
    }
}

impl From<RedirectError> for Halt {
    fn from(e: RedirectError) -> Self {
        Self::render(e)
    }
}

impl From<Forbidden> for Halt {
    fn from(e: Forbidden) -> Self {
        Self::render(e)
    }
}

impl From<BoxError> for Halt {
    fn from(e: BoxError) -> Self {
        Self::Error(e)
    }
}

impl From<serde_json::Error> for Halt {
    fn from(e: serde_json::Error) -> Self {
        Self::error(e)
    }
}

impl From<DecodeError> for Halt {
    fn from(e: DecodeError) -> Self {
        Self::error(e)
    }
}

impl From<std::io::Error> for Halt {
    fn from(e: std::io::Error) -> Self {
        Self::error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_leaves_out_missing_data() {
        let reply = ApiReply::<()>::ok(None);
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"errno":0,"errmsg":""}"#);

        let data = json!({"Got": "42/hi"});
        let reply = ApiReply::ok(Some(&data));
        assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"errno":0,"errmsg":"","data":{"Got":"42/hi"}}"#);
    }

    #[test]
    fn api_error_status() {
        assert_eq!(ApiError::new(1, "x", None).status(), StatusCode::OK);
        assert_eq!(ApiError::new(1, "x", None).with_status(400).status(), StatusCode::BAD_REQUEST);

        let zero = ApiError { code: 1, message: "x".into(), payload: None, status_code: 0 };
        assert_eq!(zero.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn halt_from_errors() {
        assert!(matches!(Halt::from(ApiError::new(17, "nope", None)), Halt::Render(_)));
        assert!(matches!(Halt::from(RedirectError::found("/login")), Halt::Render(_)));
        assert!(matches!(Halt::from(Forbidden::new("no")), Halt::Render(_)));

        let halt = Halt::error("boom");
        assert_eq!(halt.to_string(), "boom");
    }
}
