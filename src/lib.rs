//! Reliable, ordered, multiplexed messaging for transports that only
//! promise "a frame may arrive".
//!
//! The stack has three layers, each usable on its own:
//!
//! * [`wire`] frames carry a cyclic sequence number and a selective ack
//!   list in a fixed binary layout.
//! * [`DeliveryEngine`] turns an unreliable frame channel into a reliable
//!   stream with explicit retransmission, and classifies every arrival
//!   for consumers that prefer latency over ordering.
//! * [`Multiplexer`] packs remote calls, fire-and-forget events, and
//!   object tree synchronization into those frames.
//!
//! [`Protocol`] composes the layers, and [`create_client`] /
//! [`create_server`] bootstrap an authenticated session between two of
//! them. Everything is sans-io: the crate never touches sockets, timers,
//! or threads, and every state machine can be serialized with
//! `save_state` and revived elsewhere with `restore_state`.

mod delivery;
mod handshake;
mod mux;
mod protocol;
mod snapshot;
mod sync;
mod transcoder;
mod types;
pub mod wire;

pub use delivery::{sequence, DeliveryConfig, DeliveryEngine, ReceivedBatch, ReceivedMessage};
pub use handshake::{accept_all, create_client, create_server, ServerHandshake};
pub use mux::{
    ErrorReply, IdCreator, IncomingCall, Multiplexer, MuxError, MuxMessage, MuxOutput, RpcRequest,
    RpcResponse, RpcResult, SendConfirmation,
};
pub use protocol::{Protocol, ProtocolConfig, ProtocolError, ProtocolOutput};
pub use snapshot::StateError;
pub use sync::{apply_delete, apply_sync, get_delete, get_sync, Value, ValueMap};
pub use transcoder::{MessagePackTranscoder, Transcoder};
pub use types::{RequestId, SequenceNumber, WireSequence};
pub use wire::FormatError;
