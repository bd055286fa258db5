use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::delivery::ReceivedMessage;
use crate::mux::id_creator::IdCreator;
use crate::mux::message::{ErrorReply, MuxMessage, RpcRequest, RpcResponse};
use crate::mux::MuxError;
use crate::snapshot::{decode_state, encode_state, StateError};
use crate::sync::{apply_delete, apply_sync, get_delete, get_sync, ValueMap};
use crate::transcoder::Transcoder;
use crate::types::RequestId;

/// Request ids wrap inside this range, leaving headroom below the u16
/// ceiling for transcoders with small integer encodings.
const ID_MIN: u64 = 1;
const ID_MAX: u64 = 65530;

/// An outbound remote call waiting for its response.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct PendingCall {
    method: String,
    args: Option<ByteBuf>,
    sent: bool,
}

/// An inbound remote call waiting for the local handler's response.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct PendingResponse {
    method: String,
    result: Option<RpcResponse>,
}

/// A remote call surfaced to the local handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingCall {
    pub id: RequestId,
    pub method: String,
    pub args: Option<Vec<u8>>,
}

/// A completed outbound remote call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcResult {
    pub id: RequestId,
    pub method: String,
    /// The peer's return payload, or its error payload.
    pub result: Result<Vec<u8>, Vec<u8>>,
}

/// Everything one [`Multiplexer::receive_message`] call surfaced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MuxOutput {
    pub events: Vec<Vec<u8>>,
    pub events_ordered: Vec<Vec<u8>>,
    pub calls: Vec<IncomingCall>,
    pub results: Vec<RpcResult>,
    /// Wholesale replacement of the incoming object tree, when one arrived.
    pub obj_all: Option<ValueMap>,
    pub obj_sync: Option<ValueMap>,
    pub obj_delete: Option<ValueMap>,
    pub remote_error: Option<ErrorReply>,
}

/// Receipt for a [`send_unconfirmed`] frame. Feeding it back through
/// [`confirm_send`] commits the state changes the frame implies.
///
/// [`send_unconfirmed`]: Multiplexer::send_unconfirmed
/// [`confirm_send`]: Multiplexer::confirm_send
#[derive(Clone, Debug)]
pub struct SendConfirmation {
    request_ids: Vec<RequestId>,
    ordered_request_ids: Vec<RequestId>,
    response_ids: Vec<RequestId>,
    event_count: usize,
    ordered_event_count: usize,
    sent_full_object: bool,
    last_sent: ValueMap,
}

/// Multiplexes remote calls, fire-and-forget events, and object
/// synchronization into single frames, and demultiplexes them back.
///
/// The multiplexer does not deliver anything itself. Its frames are made
/// reliable by a [`DeliveryEngine`](crate::DeliveryEngine), or trusted to
/// an already-ordered transport.
pub struct Multiplexer {
    transcoder: Box<dyn Transcoder>,
    id_creator: IdCreator,
    outgoing: ValueMap,
    outgoing_last_sent: ValueMap,
    incoming: ValueMap,
    send_full_object: bool,
    requests: BTreeMap<RequestId, PendingCall>,
    requests_ordered: BTreeMap<RequestId, PendingCall>,
    pending_responses: BTreeMap<RequestId, PendingResponse>,
    events: Vec<Vec<u8>>,
    events_ordered: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct MuxSnapshot {
    id_creator: IdCreator,
    outgoing: ValueMap,
    outgoing_last_sent: ValueMap,
    incoming: ValueMap,
    send_full_object: bool,
    requests: BTreeMap<RequestId, PendingCall>,
    requests_ordered: BTreeMap<RequestId, PendingCall>,
    pending_responses: BTreeMap<RequestId, PendingResponse>,
    events: Vec<ByteBuf>,
    events_ordered: Vec<ByteBuf>,
}

impl Multiplexer {
    pub fn new(transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            id_creator: IdCreator::new(ID_MIN, ID_MAX),
            outgoing: ValueMap::new(),
            outgoing_last_sent: ValueMap::new(),
            incoming: ValueMap::new(),
            send_full_object: false,
            requests: BTreeMap::new(),
            requests_ordered: BTreeMap::new(),
            pending_responses: BTreeMap::new(),
            events: Vec::new(),
            events_ordered: Vec::new(),
        }
    }

    // Object synchronization

    /// The locally owned object tree. Mutate it freely; the next send
    /// carries a minimal diff against what the peer last saw.
    pub fn outgoing(&self) -> &ValueMap {
        &self.outgoing
    }

    pub fn outgoing_mut(&mut self) -> &mut ValueMap {
        &mut self.outgoing
    }

    /// The peer's object tree as reconstructed from received diffs.
    pub fn incoming(&self) -> &ValueMap {
        &self.incoming
    }

    /// Makes the next send carry the whole outgoing tree instead of a
    /// diff. Used to resynchronize a peer with unknown state.
    pub fn request_full_object(&mut self) {
        self.send_full_object = true;
    }

    // Remote calls and events

    /// Queues a remote call. The peer's answer comes back as an
    /// [`RpcResult`] with the returned id.
    pub fn call_fn(&mut self, method: &str, args: Option<Vec<u8>>) -> RequestId {
        let id = self.id_creator.next();
        self.requests.insert(
            id,
            PendingCall {
                method: method.to_owned(),
                args: args.map(ByteBuf::from),
                sent: false,
            },
        );
        id
    }

    /// Like [`call_fn`](Self::call_fn), but the call only executes on the
    /// peer in stream order.
    pub fn call_fn_ordered(&mut self, method: &str, args: Option<Vec<u8>>) -> RequestId {
        let id = self.id_creator.next();
        self.requests_ordered.insert(
            id,
            PendingCall {
                method: method.to_owned(),
                args: args.map(ByteBuf::from),
                sent: false,
            },
        );
        id
    }

    /// Answers an inbound call previously surfaced as an [`IncomingCall`].
    /// The response rides on the next send.
    pub fn send_fn_call_response(
        &mut self,
        id: RequestId,
        returns: Option<Vec<u8>>,
        is_error: bool,
    ) -> Result<(), MuxError> {
        let pending = self
            .pending_responses
            .get_mut(&id)
            .ok_or(MuxError::UnknownPendingCall { id })?;
        pending.result = Some(RpcResponse {
            returns: returns.map(ByteBuf::from),
            is_error,
        });
        Ok(())
    }

    /// Queues a fire-and-forget event with no ordering guarantee.
    pub fn send_event(&mut self, event: Vec<u8>) {
        self.events.push(event);
    }

    /// Queues a fire-and-forget event delivered in stream order.
    pub fn send_event_ordered(&mut self, event: Vec<u8>) {
        self.events_ordered.push(event);
    }

    // Sending

    /// Assembles a frame with all unsent data without committing to it.
    ///
    /// Nothing is marked sent until the returned [`SendConfirmation`] is
    /// passed to [`confirm_send`](Self::confirm_send), so a frame the
    /// transport rejects can simply be dropped and rebuilt later.
    pub fn send_unconfirmed(&self) -> Result<(Vec<u8>, SendConfirmation), MuxError> {
        let mut message = MuxMessage::default();
        let mut confirmation = SendConfirmation {
            request_ids: Vec::new(),
            ordered_request_ids: Vec::new(),
            response_ids: Vec::new(),
            event_count: self.events.len(),
            ordered_event_count: self.events_ordered.len(),
            sent_full_object: self.send_full_object,
            last_sent: self.outgoing.clone(),
        };

        for (&id, call) in &self.requests {
            if call.sent {
                continue;
            }
            confirmation.request_ids.push(id);
            message.req_rpc.insert(
                id,
                RpcRequest {
                    method: call.method.clone(),
                    args: call.args.clone(),
                },
            );
        }
        for (&id, call) in &self.requests_ordered {
            if call.sent {
                continue;
            }
            confirmation.ordered_request_ids.push(id);
            message.req_rpc_ordered.insert(
                id,
                RpcRequest {
                    method: call.method.clone(),
                    args: call.args.clone(),
                },
            );
        }
        for (&id, pending) in &self.pending_responses {
            if let Some(result) = &pending.result {
                confirmation.response_ids.push(id);
                message.res_rpc.insert(id, result.clone());
            }
        }

        message.events = self.events.iter().cloned().map(ByteBuf::from).collect();
        message.events_ordered = self
            .events_ordered
            .iter()
            .cloned()
            .map(ByteBuf::from)
            .collect();

        if self.send_full_object {
            message.obj_all = Some(self.outgoing.clone());
        } else {
            let delete = get_delete(&self.outgoing_last_sent, &self.outgoing);
            if !delete.is_empty() {
                message.obj_delete = Some(delete);
            }
            let sync = get_sync(&self.outgoing_last_sent, &self.outgoing);
            if !sync.is_empty() {
                message.obj_sync = Some(sync);
            }
        }

        let buf = self.transcoder.encode(&message)?;
        Ok((buf, confirmation))
    }

    /// Commits a frame built by [`send_unconfirmed`](Self::send_unconfirmed)
    /// once the transport has accepted it.
    pub fn confirm_send(&mut self, confirmation: SendConfirmation) {
        for id in &confirmation.request_ids {
            if let Some(call) = self.requests.get_mut(id) {
                call.sent = true;
            }
        }
        for id in &confirmation.ordered_request_ids {
            if let Some(call) = self.requests_ordered.get_mut(id) {
                call.sent = true;
            }
        }
        for id in &confirmation.response_ids {
            self.pending_responses.remove(id);
        }
        self.events
            .drain(..confirmation.event_count.min(self.events.len()));
        self.events_ordered
            .drain(..confirmation.ordered_event_count.min(self.events_ordered.len()));
        if confirmation.sent_full_object {
            self.send_full_object = false;
        }
        self.outgoing_last_sent = confirmation.last_sent;
    }

    /// Assembles and immediately commits a frame.
    pub fn send(&mut self) -> Result<Vec<u8>, MuxError> {
        let (buf, confirmation) = self.send_unconfirmed()?;
        self.confirm_send(confirmation);
        Ok(buf)
    }

    // Receiving

    /// Demultiplexes a batch of delivery-classified frames.
    ///
    /// Unordered sections are taken from every frame. Ordered sections are
    /// skipped on [`ReceivedMessage::Unordered`] arrivals; the same frame
    /// comes back through the ordered stream later.
    pub fn receive_message(&mut self, frames: &[ReceivedMessage]) -> Result<MuxOutput, MuxError> {
        // Decode the whole batch before touching any state, so one
        // undecodable frame cannot leave a half-applied batch behind.
        let mut decoded = Vec::with_capacity(frames.len());
        for frame in frames {
            decoded.push((frame, self.transcoder.decode(frame.payload())?));
        }

        let mut out = MuxOutput::default();
        for (frame, message) in &decoded {
            // An Ordered arrival is a payload coming back through the
            // ordered stream; its unordered sections were already handled
            // when it first surfaced.
            if !matches!(frame, ReceivedMessage::Ordered(_)) {
                for event in &message.events {
                    out.events.push(event.clone().into_vec());
                }
                for (&id, request) in &message.req_rpc {
                    self.register_incoming_call(id, request, &mut out);
                }
                for (&id, response) in &message.res_rpc {
                    self.resolve_result(id, response, &mut out);
                }
                if let Some(error) = message.error() {
                    out.remote_error = Some(error);
                }
            }

            if frame.is_unordered() {
                continue;
            }

            for event in &message.events_ordered {
                out.events_ordered.push(event.clone().into_vec());
            }
            for (&id, request) in &message.req_rpc_ordered {
                self.register_incoming_call(id, request, &mut out);
            }
            if let Some(all) = &message.obj_all {
                self.incoming = all.clone();
                out.obj_all = Some(all.clone());
            }
            if let Some(delete) = &message.obj_delete {
                self.incoming = apply_delete(&self.incoming, delete);
                out.obj_delete = Some(match out.obj_delete.take() {
                    Some(prev) => apply_sync(&prev, delete),
                    None => delete.clone(),
                });
            }
            if let Some(sync) = &message.obj_sync {
                self.incoming = apply_sync(&self.incoming, sync);
                out.obj_sync = Some(match out.obj_sync.take() {
                    Some(prev) => apply_sync(&prev, sync),
                    None => sync.clone(),
                });
            }
        }
        Ok(out)
    }

    fn register_incoming_call(&mut self, id: RequestId, request: &RpcRequest, out: &mut MuxOutput) {
        if self.pending_responses.contains_key(&id) {
            warn!(
                "peer reused call id {id} before its previous call was answered, replacing"
            );
        }
        self.pending_responses.insert(
            id,
            PendingResponse {
                method: request.method.clone(),
                result: None,
            },
        );
        out.calls.push(IncomingCall {
            id,
            method: request.method.clone(),
            args: request.args.clone().map(ByteBuf::into_vec),
        });
    }

    fn resolve_result(&mut self, id: RequestId, response: &RpcResponse, out: &mut MuxOutput) {
        let call = match self.requests.remove(&id) {
            Some(call) => call,
            None => match self.requests_ordered.remove(&id) {
                Some(call) => call,
                None => {
                    warn!("dropping response for a call that was never made, id {id}");
                    return;
                }
            },
        };
        let returns = response
            .returns
            .clone()
            .map(ByteBuf::into_vec)
            .unwrap_or_default();
        out.results.push(RpcResult {
            id,
            method: call.method,
            result: if response.is_error {
                Err(returns)
            } else {
                Ok(returns)
            },
        });
    }

    // Snapshots

    /// Serializes all queues, tables, and object trees into an opaque
    /// string. The transcoder is not part of the snapshot.
    pub fn save_state(&self) -> Result<String, StateError> {
        let snapshot = MuxSnapshot {
            id_creator: self.id_creator.clone(),
            outgoing: self.outgoing.clone(),
            outgoing_last_sent: self.outgoing_last_sent.clone(),
            incoming: self.incoming.clone(),
            send_full_object: self.send_full_object,
            requests: self.requests.clone(),
            requests_ordered: self.requests_ordered.clone(),
            pending_responses: self.pending_responses.clone(),
            events: self.events.iter().cloned().map(ByteBuf::from).collect(),
            events_ordered: self
                .events_ordered
                .iter()
                .cloned()
                .map(ByteBuf::from)
                .collect(),
        };
        encode_state(&snapshot)
    }

    /// Rebuilds a multiplexer from [`save_state`](Self::save_state) output.
    pub fn restore_state(transcoder: Box<dyn Transcoder>, state: &str) -> Result<Self, StateError> {
        let snapshot: MuxSnapshot = decode_state(state)?;
        Ok(Self {
            transcoder,
            id_creator: snapshot.id_creator,
            outgoing: snapshot.outgoing,
            outgoing_last_sent: snapshot.outgoing_last_sent,
            incoming: snapshot.incoming,
            send_full_object: snapshot.send_full_object,
            requests: snapshot.requests,
            requests_ordered: snapshot.requests_ordered,
            pending_responses: snapshot.pending_responses,
            events: snapshot.events.into_iter().map(ByteBuf::into_vec).collect(),
            events_ordered: snapshot
                .events_ordered
                .into_iter()
                .map(ByteBuf::into_vec)
                .collect(),
        })
    }
}
