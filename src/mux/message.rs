use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::sync::ValueMap;
use crate::types::RequestId;

/// One remote call as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ByteBuf>,
}

/// The response to one remote call as it travels on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "is_false", rename = "isError")]
    pub is_error: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// An error the remote side announces instead of a regular payload,
/// typically while rejecting a connection attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: u32,
    pub reason: String,
}

/// The record every multiplexed frame carries. Sections left at their
/// defaults stay off the wire.
///
/// Unordered sections (`events`, `req_rpc`, `res_rpc`) are processed on
/// every arrival; ordered sections only once the frame has passed through
/// the ordered stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuxMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj_all: Option<ValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj_sync: Option<ValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj_delete: Option<ValueMap>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub req_rpc: BTreeMap<RequestId, RpcRequest>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub req_rpc_ordered: BTreeMap<RequestId, RpcRequest>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub res_rpc: BTreeMap<RequestId, RpcResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ByteBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events_ordered: Vec<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MuxMessage {
    /// True when nothing would reach the wire.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn error(&self) -> Option<ErrorReply> {
        if self.code.is_none() && self.reason.is_none() {
            return None;
        }
        Some(ErrorReply {
            code: self.code.unwrap_or(0),
            reason: self.reason.clone().unwrap_or_default(),
        })
    }
}
