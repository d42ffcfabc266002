//! `tokio_util::codec` implementations for the wire format.
//!
//! [`RequestDecoder`] yields fully buffered requests, [`ResponseEncoder`] writes
//! fully buffered responses.

mod request_decoder;
mod response_encoder;

pub use request_decoder::DEFAULT_MAX_BODY_BYTES;
pub use request_decoder::MAX_HEADER_BYTES;
pub use request_decoder::MAX_HEADER_NUM;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
