//! Pluggable serialization of [`MuxMessage`] records.

use crate::mux::{MuxError, MuxMessage};

/// Turns [`MuxMessage`] records into bytes and back.
///
/// Implementations must round-trip exactly: `decode(encode(m)) == m` for
/// every message they accept. Both peers of a connection must use the
/// same transcoder.
pub trait Transcoder {
    fn encode(&self, message: &MuxMessage) -> Result<Vec<u8>, MuxError>;
    fn decode(&self, buf: &[u8]) -> Result<MuxMessage, MuxError>;
}

/// The default transcoder. Encodes messages as MessagePack maps with
/// field names, so empty sections cost nothing on the wire and unknown
/// fields from newer peers are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagePackTranscoder;

impl Transcoder for MessagePackTranscoder {
    fn encode(&self, message: &MuxMessage) -> Result<Vec<u8>, MuxError> {
        rmp_serde::to_vec_named(message).map_err(|e| MuxError::Transcode {
            reason: e.to_string(),
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<MuxMessage, MuxError> {
        // a zero-length payload is a frame with nothing multiplexed on it
        if buf.is_empty() {
            return Ok(MuxMessage::default());
        }
        rmp_serde::from_slice(buf).map_err(|e| MuxError::Transcode {
            reason: e.to_string(),
        })
    }
}
