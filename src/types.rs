/// A logical sequence number. Counts up from 1 without bound; only its
/// wire projection wraps.
pub type SequenceNumber = u64;

/// A sequence number as it appears on the wire, folded into the cyclic
/// window.
pub type WireSequence = u16;

/// Correlates an outbound remote call with its eventual response.
pub type RequestId = u64;
