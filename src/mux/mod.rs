//! Multiplexing of calls, events, and object sync over one frame stream.

mod error;
mod id_creator;
mod message;
mod multiplexer;

pub use error::MuxError;
pub use id_creator::IdCreator;
pub use message::{ErrorReply, MuxMessage, RpcRequest, RpcResponse};
pub use multiplexer::{IncomingCall, Multiplexer, MuxOutput, RpcResult, SendConfirmation};
