use thiserror::Error;

/// Raised when a frame cannot be encoded to or decoded from its wire layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("frame truncated while reading {field}: needed {needed} more byte(s)")]
    Truncated { field: &'static str, needed: usize },
    #[error("ack list holds {count} entries, wire limit is {max}")]
    TooManyAcks { count: usize, max: usize },
    #[error("client id is {len} bytes, wire limit is {max}")]
    IdTooLong { len: usize, max: usize },
}
