mod http_connection;

pub use http_connection::HttpConnection;
