//! Decoding strategies for the argument of a handler function.
//!
//! [`FormDecoding`] reads the form (url-encoded body plus query string) and maps keys onto
//! fields by their serde name, so `#[serde(rename = "foo")]` plays the role of a form tag.
//! A key repeated in the form fills a sequence field such as `Vec<i32>`; repeat keys only for
//! sequence fields. Keys the target does not know are ignored.
//!
//! A field whose key is absent is a decode error (and so a `500`) unless it is an `Option` or
//! carries `#[serde(default)]`.
//!
//! [`JsonDecoding`] reads the request body as JSON.
//!
//! # Example
//! ```
//! # use serde::Deserialize;
//! # use apify::extract::Timestamp;
//! # #[allow(dead_code)]
//! #[derive(Deserialize)]
//! struct Query {
//!     #[serde(rename = "foo")]
//!     foo: i32,
//!     #[serde(rename = "since", default)]
//!     since: Option<Timestamp>,
//!     #[serde(rename = "id", default)]
//!     ids: Vec<u64>,
//! }
//! ```

mod timestamp;

pub use timestamp::Timestamp;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::request::ApiRequest;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("form encode error: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    #[error("form decode error: {0}")]
    Form(#[from] serde_html_form::de::Error),

    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How the argument of a handler function is read from the request.
pub trait Decoding: Send + Sync + 'static {
    fn decode<A: DeserializeOwned>(request: &ApiRequest) -> Result<A, DecodeError>;
}

/// Decodes every form pair, body pairs before query pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormDecoding;

impl Decoding for FormDecoding {
    fn decode<A: DeserializeOwned>(request: &ApiRequest) -> Result<A, DecodeError> {
        let pairs: Vec<(&str, &str)> = request.form().iter().collect();
        let encoded = serde_urlencoded::to_string(pairs)?;
        Ok(serde_html_form::from_str(&encoded)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoding;

impl Decoding for JsonDecoding {
    fn decode<A: DeserializeOwned>(request: &ApiRequest) -> Result<A, DecodeError> {
        Ok(serde_json::from_slice(request.body())?)
    }
}
