//! The full stack: multiplexing on top of optional reliable delivery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delivery::{DeliveryConfig, DeliveryEngine, ReceivedMessage};
use crate::mux::{Multiplexer, MuxError, MuxOutput, SendConfirmation};
use crate::snapshot::{decode_state, encode_state, StateError};
use crate::sync::ValueMap;
use crate::transcoder::Transcoder;
use crate::types::RequestId;
use crate::wire::FormatError;

#[derive(Clone, Debug, Default)]
pub struct ProtocolConfig {
    /// Run frames through a [`DeliveryEngine`] with these settings. Leave
    /// unset when the transport already guarantees order and delivery.
    pub ordering: Option<DeliveryConfig>,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// Everything one receive call produced.
#[derive(Clone, Debug, Default)]
pub struct ProtocolOutput {
    /// Frames the delivery layer wants on the wire now.
    pub to_send: Vec<Vec<u8>>,
    /// Demultiplexed application data.
    pub output: MuxOutput,
}

/// A peer-to-peer session: one [`Multiplexer`], optionally backed by a
/// [`DeliveryEngine`].
///
/// Built by [`create_client`](crate::create_client) and
/// [`create_server`](crate::create_server), or directly through
/// [`Protocol::new`] when no handshake is wanted.
pub struct Protocol {
    mux: Multiplexer,
    delivery: Option<DeliveryEngine>,
}

#[derive(Serialize, Deserialize)]
struct ProtocolSnapshot {
    mux: String,
    delivery: Option<String>,
}

impl Protocol {
    pub fn new(config: ProtocolConfig, transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            mux: Multiplexer::new(transcoder),
            delivery: config.ordering.map(DeliveryEngine::new),
        }
    }

    /// The delivery engine, when ordering is enabled.
    pub fn delivery(&self) -> Option<&DeliveryEngine> {
        self.delivery.as_ref()
    }

    // Receiving

    /// Ingests one raw frame from the transport.
    pub fn receive_message(&mut self, frame: &[u8]) -> Result<ProtocolOutput, ProtocolError> {
        let frames = [frame.to_vec()];
        self.receive_messages(&frames)
    }

    /// Ingests a batch of raw frames from the transport.
    pub fn receive_messages(&mut self, frames: &[Vec<u8>]) -> Result<ProtocolOutput, ProtocolError> {
        match &mut self.delivery {
            Some(engine) => {
                let batch = engine.receive_messages(frames)?;
                let output = self.mux.receive_message(&batch.messages)?;
                Ok(ProtocolOutput {
                    to_send: batch.to_send,
                    output,
                })
            }
            None => {
                let messages: Vec<ReceivedMessage> = frames
                    .iter()
                    .map(|frame| ReceivedMessage::Full(frame.clone()))
                    .collect();
                let output = self.mux.receive_message(&messages)?;
                Ok(ProtocolOutput {
                    to_send: Vec::new(),
                    output,
                })
            }
        }
    }

    /// Feeds a payload straight to the multiplexer, bypassing delivery.
    /// Used for the handshake, which runs before sequencing starts.
    pub(crate) fn receive_unsequenced(&mut self, payload: &[u8]) -> Result<MuxOutput, MuxError> {
        self.mux
            .receive_message(&[ReceivedMessage::Full(payload.to_vec())])
    }

    // Sending

    /// Flushes all unsent multiplexer data into one frame.
    pub fn send(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let (buf, confirmation) = self.mux.send_unconfirmed()?;
        let frame = match &mut self.delivery {
            Some(engine) => engine.send(buf)?,
            None => buf,
        };
        self.mux.confirm_send(confirmation);
        Ok(frame)
    }

    /// Like [`send`](Self::send), but nothing is committed until the
    /// returned confirmation is passed to [`confirm_send`](Self::confirm_send).
    ///
    /// Only available without ordering: a delivery engine assigns the
    /// frame a sequence number, which cannot be taken back.
    pub fn send_unconfirmed(&self) -> Result<Option<(Vec<u8>, SendConfirmation)>, ProtocolError> {
        if self.delivery.is_some() {
            return Ok(None);
        }
        Ok(Some(self.mux.send_unconfirmed()?))
    }

    pub fn confirm_send(&mut self, confirmation: SendConfirmation) {
        self.mux.confirm_send(confirmation);
    }

    /// Builds an ack-only frame. `None` when ordering is disabled.
    pub fn send_acks(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        match &mut self.delivery {
            Some(engine) => Ok(Some(engine.send_acks()?)),
            None => Ok(None),
        }
    }

    /// Re-encodes every frame the peer reported lost.
    pub fn send_failed_messages(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        match &mut self.delivery {
            Some(engine) => Ok(engine.send_failed_messages()?),
            None => Ok(Vec::new()),
        }
    }

    // Multiplexer surface

    pub fn call_fn(&mut self, method: &str, args: Option<Vec<u8>>) -> RequestId {
        self.mux.call_fn(method, args)
    }

    pub fn call_fn_ordered(&mut self, method: &str, args: Option<Vec<u8>>) -> RequestId {
        self.mux.call_fn_ordered(method, args)
    }

    pub fn send_fn_call_response(
        &mut self,
        id: RequestId,
        returns: Option<Vec<u8>>,
        is_error: bool,
    ) -> Result<(), MuxError> {
        self.mux.send_fn_call_response(id, returns, is_error)
    }

    pub fn send_event(&mut self, event: Vec<u8>) {
        self.mux.send_event(event);
    }

    pub fn send_event_ordered(&mut self, event: Vec<u8>) {
        self.mux.send_event_ordered(event);
    }

    pub fn outgoing(&self) -> &ValueMap {
        self.mux.outgoing()
    }

    pub fn outgoing_mut(&mut self) -> &mut ValueMap {
        self.mux.outgoing_mut()
    }

    pub fn incoming(&self) -> &ValueMap {
        self.mux.incoming()
    }

    pub fn request_full_object(&mut self) {
        self.mux.request_full_object();
    }

    // Snapshots

    /// Serializes the whole session into an opaque string.
    pub fn save_state(&self) -> Result<String, StateError> {
        let snapshot = ProtocolSnapshot {
            mux: self.mux.save_state()?,
            delivery: match &self.delivery {
                Some(engine) => Some(engine.save_state()?),
                None => None,
            },
        };
        encode_state(&snapshot)
    }

    /// Rebuilds a session from [`save_state`](Self::save_state) output.
    /// The config's ordering setting must match the captured session.
    pub fn restore_state(
        config: ProtocolConfig,
        transcoder: Box<dyn Transcoder>,
        state: &str,
    ) -> Result<Self, StateError> {
        let snapshot: ProtocolSnapshot = decode_state(state)?;
        let delivery = match (config.ordering, snapshot.delivery) {
            (Some(delivery_config), Some(state)) => {
                Some(DeliveryEngine::restore_state(delivery_config, &state)?)
            }
            (None, None) => None,
            _ => {
                return Err(StateError::Deserialize {
                    reason: "ordering setting does not match the captured session".into(),
                })
            }
        };
        Ok(Self {
            mux: Multiplexer::restore_state(transcoder, &snapshot.mux)?,
            delivery,
        })
    }
}
