//! Portable state snapshots.
//!
//! Engine state is serialized to MessagePack and wrapped in base64 so it
//! can travel through JSON documents, environment blocks, or key-value
//! stores without escaping trouble.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to serialize state: {reason}")]
    Serialize { reason: String },
    #[error("failed to deserialize state: {reason}")]
    Deserialize { reason: String },
}

pub(crate) fn encode_state<T: Serialize>(value: &T) -> Result<String, StateError> {
    let bytes = rmp_serde::to_vec(value).map_err(|e| StateError::Serialize {
        reason: e.to_string(),
    })?;
    Ok(BASE64.encode(bytes))
}

pub(crate) fn decode_state<T: DeserializeOwned>(state: &str) -> Result<T, StateError> {
    let bytes = BASE64.decode(state).map_err(|e| StateError::Deserialize {
        reason: e.to_string(),
    })?;
    rmp_serde::from_slice(&bytes).map_err(|e| StateError::Deserialize {
        reason: e.to_string(),
    })
}
