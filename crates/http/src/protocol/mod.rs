//! Protocol level types shared by the codec and the connection loop.

mod error;

pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

use std::net::SocketAddr;

/// The peer address of the connection a request arrived on.
///
/// [`HttpConnection`](crate::connection::HttpConnection) inserts it into the request
/// extensions when the connection was built with
/// [`with_remote_addr`](crate::connection::HttpConnection::with_remote_addr).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteAddr(pub SocketAddr);
