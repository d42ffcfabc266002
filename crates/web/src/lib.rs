//! JSON API endpoints out of plain async functions
//!
//! An endpoint is a [`Chain`] of stages: an optional authentication stage such as
//! [`sign::SignGuard`], an [`AccessLog`], a [`Dispatcher`] that decodes the argument and calls
//! the function, and the [`JsonWriter`] that renders the result as
//! `{"errno":0,"errmsg":"","data":...}` (JSONP with `callback`, indented with `_pretty_`,
//! gzipped above [`GZIP_MIN_LENGTH`] bytes).
//!
//! [`schema_rpc`] fills the argument from the form: serde names are the form keys, a repeated
//! key fills a `Vec` field, and a missing key is a decode error answered `500` unless the field
//! is an `Option` or has `#[serde(default)]`. [`json_rpc`] and [`apify`] read a JSON body.
//!
//! # Example
//!
//! ```no_run
//! use apify::{ApiError, ApiMap, Server, apify};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Sum {
//!     xs: Vec<i64>,
//! }
//!
//! #[derive(Serialize)]
//! struct Total {
//!     #[serde(rename = "S")]
//!     s: i64,
//! }
//!
//! async fn sum(p: Sum) -> Result<Total, ApiError> {
//!     Ok(Total { s: p.xs.iter().sum() })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let apis = ApiMap::new().api("/api/sum", apify(sum));
//!     match Server::builder().handler(apis).address("127.0.0.1:8080").build() {
//!         Ok(server) => server.start().await,
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

mod access_log;
mod api_map;
mod body;
mod chain;
mod context;
mod encoding;
mod error;
mod fn_trait;
mod handler;
mod json;
mod request;
mod responder;
mod result;
mod server;

pub mod extract;
pub mod sign;

pub use access_log::{AccessLog, ExtensionIdentity, IdentityResolver, UserInfo, client_address};
pub use api_map::ApiMap;
pub use body::ResponseBody;
pub use chain::{Chain, ChainBuilder, FailedStage, Flow, Stage, apify, apify_auth, apify_with_identity};
pub use context::{HttpInfo, RequestContext, ResponseSink};
pub use error::{ApiError, ApiReply, BoxError, Forbidden, Halt, RedirectError};
pub use extract::{DecodeError, Timestamp};
pub use fn_trait::{RequestShape, RpcFn, WithArg, WithRequest};
pub use handler::{Dispatcher, json_rpc, schema_rpc};
pub use json::{GZIP_MIN_LENGTH, JsonWriter, write_json};
pub use request::{ApiRequest, Form};
pub use responder::{Responder, internal_error};
pub use result::{ApiResult, ApiStream, IntoApiResult, JsonValue, RESULT_SLOT};
pub use server::{Server, ServerBuildError, ServerBuilder};
