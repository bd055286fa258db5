use thiserror::Error;

use crate::types::RequestId;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("no pending inbound call with id {id}")]
    UnknownPendingCall { id: RequestId },
    #[error("transcoding failed: {reason}")]
    Transcode { reason: String },
}
