//! Gzip compression of rendered response bodies.

use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::GzEncoder;
use http::{HeaderMap, header};
use tracing::trace;

/// In-memory sink the gzip encoder writes into.
#[derive(Debug)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity) }
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compresses `data` into a complete gzip member.
///
/// The encoder lives only inside this call and is dropped on the error path as well.
pub(crate) fn gzip(data: &[u8]) -> io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Writer::with_capacity(data.len() / 2 + 64), Compression::default());
    if let Err(err) = encoder.write_all(data) {
        trace!("Error encoding gzip encoding: {}", err);
        return Err(err);
    }
    let writer = encoder.finish()?;
    Ok(writer.buf.freeze())
}

/// True when any `Accept-Encoding` value mentions gzip.
pub(crate) fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("gzip"))
}
