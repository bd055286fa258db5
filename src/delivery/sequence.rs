//! Projection between unbounded logical sequence numbers and the cyclic
//! wire window.

use crate::types::{SequenceNumber, WireSequence};

/// Folds a logical sequence number (1-based) into the wire window
/// `[1, seq_max]`.
pub fn wire_seq(seq: SequenceNumber, seq_max: u64) -> WireSequence {
    (((seq - 1) % seq_max) + 1) as WireSequence
}

/// Wire values below this mark are rollover candidates.
pub fn lower_threshold(seq_max: u64) -> u64 {
    seq_max / 10
}

/// Receivers past this point in the window treat low wire values as the
/// next cycle.
pub fn upper_threshold(seq_max: u64) -> u64 {
    seq_max * 9 / 10
}
