//! What a handler function leaves in the request context for the JSON writer.

use std::fmt;

use serde::Serialize;

use crate::error::ApiReply;
use crate::json;

/// Name of the context slot holding the handler result.
pub const RESULT_SLOT: &str = "rest.api.result";

/// A serializable value with its concrete type erased.
pub trait JsonValue: Send {
    /// The value alone, used for stream records.
    fn to_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>>;

    /// The value wrapped in a success [`ApiReply`].
    fn to_reply_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send> JsonValue for T {
    fn to_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>> {
        json::encode(self, pretty)
    }

    fn to_reply_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>> {
        json::encode(&ApiReply::ok(Some(self)), pretty)
    }
}

/// A finite, lazily produced sequence of records.
///
/// The JSON writer pulls the items in order and writes each one as its own record,
/// without the [`ApiReply`] envelope.
pub struct ApiStream {
    items: Box<dyn Iterator<Item = Box<dyn JsonValue>> + Send>,
}

impl ApiStream {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Serialize + Send + 'static,
    {
        Self { items: Box::new(items.into_iter().map(|item| Box::new(item) as Box<dyn JsonValue>)) }
    }
}

impl Iterator for ApiStream {
    type Item = Box<dyn JsonValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

impl fmt::Debug for ApiStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiStream").finish_non_exhaustive()
    }
}

pub enum ApiResult {
    Value(Box<dyn JsonValue>),
    Stream(ApiStream),
}

impl fmt::Debug for ApiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

/// Conversion of a handler function's output into the context slot value.
pub trait IntoApiResult {
    fn into_api_result(self) -> ApiResult;
}

impl<T: Serialize + Send + 'static> IntoApiResult for T {
    fn into_api_result(self) -> ApiResult {
        ApiResult::Value(Box::new(self))
    }
}

impl IntoApiResult for ApiStream {
    fn into_api_result(self) -> ApiResult {
        ApiResult::Stream(self)
    }
}
