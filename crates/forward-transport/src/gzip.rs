//! Manual gzip decoding (§6): the core disables reqwest's built-in content-decoding (see
//! the agent pool) and decodes `content-encoding: gzip` bodies itself, through a decoder
//! that swallows a late `unexpected end of stream` — upstreams that close the TCP
//! connection a few bytes early on an otherwise-complete gzip stream are common enough
//! that treating it as fatal would turn a cosmetic truncation into a failed request.

use std::io;

use async_compression::tokio::bufread::GzipDecoder;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::io::{ReaderStream, StreamReader};

/// Wraps a raw byte stream (as produced by the transport, still gzip-compressed) in a
/// gzip decoder and returns the decoded chunks. Read errors — including a late
/// `UnexpectedEof`, which a well-formed-but-truncated gzip trailer produces — close the
/// stream gracefully instead of propagating, per §6's "convert upstream errors into
/// graceful close, not thrown exceptions to the consumer".
pub fn decode_gzip_body(
    body: impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let reader = StreamReader::new(body);
    let decoder = GzipDecoder::new(reader);
    ReaderStream::new(decoder).filter_map(|chunk| async move {
        match chunk {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                tracing::debug!(%error, "gzip stream ended (possibly truncated trailer), closing gracefully");
                None
            }
        }
    })
}
