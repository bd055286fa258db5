use std::collections::BTreeMap;
use std::mem;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::delivery::config::DeliveryConfig;
use crate::delivery::received::{ReceivedBatch, ReceivedMessage};
use crate::delivery::sequence;
use crate::snapshot::{decode_state, encode_state, StateError};
use crate::types::SequenceNumber;
use crate::wire::{self, FormatError};

/// An outbound payload awaiting confirmation, together with the leading
/// ack that rode along on its frame.
#[derive(Clone, Debug)]
struct SentEntry {
    payload: Vec<u8>,
    ack_attached: Option<SequenceNumber>,
}

/// Reliable, ordered delivery over an unreliable frame channel.
///
/// The engine is sans-io: it owns no sockets and no timers. Callers move
/// bytes between two engines and decide when to flush acks or
/// retransmissions, either explicitly or through the automatic policies in
/// [`DeliveryConfig`].
pub struct DeliveryEngine {
    config: DeliveryConfig,
    max_send_seq: SequenceNumber,
    max_send_seq_known_received: SequenceNumber,
    max_send_ack: SequenceNumber,
    max_send_ack_known_received: SequenceNumber,
    max_inc_seq: SequenceNumber,
    max_emitted_seq: SequenceNumber,
    rec_seq_offset: u64,
    in_transition: bool,
    sent: BTreeMap<SequenceNumber, SentEntry>,
    lost: BTreeMap<SequenceNumber, Vec<u8>>,
    received: BTreeMap<SequenceNumber, Vec<u8>>,
}

/// Serialized image of a [`DeliveryEngine`]. Field order is part of the
/// snapshot format.
#[derive(Serialize, Deserialize)]
struct EngineSnapshot {
    max_send_seq: u64,
    max_send_seq_known_received: u64,
    max_send_ack: u64,
    max_send_ack_known_received: u64,
    max_inc_seq: u64,
    max_emitted_seq: u64,
    rec_seq_offset: u64,
    in_transition: bool,
    sent: BTreeMap<u64, (ByteBuf, Option<u64>)>,
    lost: BTreeMap<u64, ByteBuf>,
    received: BTreeMap<u64, ByteBuf>,
}

impl DeliveryEngine {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            max_send_seq: 0,
            max_send_seq_known_received: 0,
            max_send_ack: 0,
            max_send_ack_known_received: 0,
            max_inc_seq: 0,
            max_emitted_seq: 0,
            rec_seq_offset: 0,
            in_transition: false,
            sent: BTreeMap::new(),
            lost: BTreeMap::new(),
            received: BTreeMap::new(),
        }
    }

    // Counters

    /// Sequence number of the newest message handed to [`send`](Self::send).
    pub fn max_send_seq(&self) -> SequenceNumber {
        self.max_send_seq
    }

    /// Highest own sequence number the peer has confirmed.
    pub fn max_send_seq_known_received(&self) -> SequenceNumber {
        self.max_send_seq_known_received
    }

    /// Highest incoming sequence number this engine has put on an outgoing
    /// ack list.
    pub fn max_send_ack(&self) -> SequenceNumber {
        self.max_send_ack
    }

    /// Highest outgoing ack the peer is known to have seen.
    pub fn max_send_ack_known_received(&self) -> SequenceNumber {
        self.max_send_ack_known_received
    }

    /// Highest sequence number received so far.
    pub fn max_inc_seq(&self) -> SequenceNumber {
        self.max_inc_seq
    }

    /// Highest sequence number released to the ordered stream.
    pub fn max_emitted_seq(&self) -> SequenceNumber {
        self.max_emitted_seq
    }

    /// Completed wire cycles on the receive side.
    pub fn rec_seq_offset(&self) -> u64 {
        self.rec_seq_offset
    }

    /// Outbound messages not yet confirmed by the peer.
    pub fn unacked_message_count(&self) -> usize {
        self.sent.len()
    }

    /// Outbound messages the peer has reported missing.
    pub fn failed_send_message_count(&self) -> usize {
        self.lost.len()
    }

    /// Gaps currently blocking the ordered stream.
    pub fn failed_receive_message_count(&self) -> u64 {
        self.max_inc_seq - self.max_emitted_seq - self.received.len() as u64
    }

    fn seq_max(&self) -> u64 {
        self.config.seq_max as u64
    }

    // Sending

    /// Wraps `payload` in a sequenced frame carrying the current ack list,
    /// and retains it for retransmission until the peer confirms it.
    pub fn send(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, FormatError> {
        let seq = self.max_send_seq + 1;
        let acks = self.get_acks();
        let frame = self.encode_frame(seq, &acks, &payload)?;
        self.max_send_seq = seq;
        let ack_attached = acks.first().copied();
        if ack_attached.is_some() {
            self.max_send_ack = self.max_inc_seq;
        }
        self.sent.insert(seq, SentEntry { payload, ack_attached });
        Ok(frame)
    }

    /// Builds an ack-only frame (wire sequence 0, empty payload).
    pub fn send_acks(&mut self) -> Result<Vec<u8>, FormatError> {
        let acks = self.get_acks();
        let frame = self.encode_frame(0, &acks, &[])?;
        if !acks.is_empty() {
            self.max_send_ack = self.max_inc_seq;
        }
        Ok(frame)
    }

    /// Re-encodes every message reported lost and moves it back into the
    /// unconfirmed set. Retransmitted frames carry an empty ack list.
    pub fn send_failed_messages(&mut self) -> Result<Vec<Vec<u8>>, FormatError> {
        let lost = mem::take(&mut self.lost);
        let mut frames = Vec::with_capacity(lost.len());
        for (seq, payload) in lost {
            let frame = self.encode_frame(seq, &[], &payload)?;
            frames.push(frame);
            self.sent.insert(
                seq,
                SentEntry {
                    payload,
                    ack_attached: None,
                },
            );
        }
        Ok(frames)
    }

    /// Current selective ack list: the highest received sequence number
    /// first, then every gap between the ordered stream position and it,
    /// ascending. Empty until anything has been received, and empty again
    /// once the peer has confirmed an ack covering everything received.
    pub fn get_acks(&self) -> Vec<SequenceNumber> {
        if self.max_inc_seq <= self.max_send_ack_known_received {
            return Vec::new();
        }
        let mut acks = vec![self.max_inc_seq];
        for seq in (self.max_emitted_seq + 1)..self.max_inc_seq {
            if !self.received.contains_key(&seq) {
                acks.push(seq);
            }
        }
        acks
    }

    fn encode_frame(
        &self,
        seq: SequenceNumber,
        acks: &[SequenceNumber],
        payload: &[u8],
    ) -> Result<Vec<u8>, FormatError> {
        let seq_max = self.seq_max();
        let wire = if seq == 0 {
            0
        } else {
            sequence::wire_seq(seq, seq_max)
        };
        let wire_acks: Vec<u16> = acks
            .iter()
            .map(|&ack| sequence::wire_seq(ack, seq_max))
            .collect();
        wire::encode_seq_ack(wire, &wire_acks, payload)
    }

    // Receiving

    /// Ingests a batch of raw frames from the peer.
    ///
    /// Ack lists across the whole batch are folded together first, then
    /// payloads are sequenced frame by frame, so a gap filled by a later
    /// frame of the same batch still releases buffered messages in order.
    pub fn receive_messages(&mut self, frames: &[Vec<u8>]) -> Result<ReceivedBatch, FormatError> {
        let mut decoded = Vec::with_capacity(frames.len());
        for frame in frames {
            let (wire_seq, wire_acks, rest) = wire::decode_seq_ack(frame)?;
            decoded.push((wire_seq, wire_acks, rest.to_vec()));
        }

        let mut batch = ReceivedBatch::default();

        self.process_acks(&decoded);
        if self.config.auto_retransmit && !self.lost.is_empty() {
            batch.to_send.extend(self.send_failed_messages()?);
        }

        for (wire_seq, _, payload) in decoded {
            self.sequence_payload(wire_seq, payload, &mut batch.messages);
        }

        if self.should_auto_ack() {
            batch.to_send.push(self.send_acks()?);
        }
        Ok(batch)
    }

    /// Folds every ack list in the batch into confirmations and, when gaps
    /// are reported, loss marks.
    fn process_acks(&mut self, decoded: &[(u16, Vec<u16>, Vec<u8>)]) {
        let base = self.ack_base();
        let mut highest_ack: Option<SequenceNumber> = None;
        let mut missing: Vec<SequenceNumber> = Vec::new();
        for (_, wire_acks, _) in decoded {
            if let Some((&lead, tail)) = wire_acks.split_first() {
                let lead = self.correct_ack(lead, base);
                highest_ack = Some(highest_ack.map_or(lead, |h| h.max(lead)));
                missing.extend(tail.iter().map(|&ack| self.correct_ack(ack, base)));
            }
        }
        let Some(highest) = highest_ack else {
            return;
        };

        if highest > self.max_send_seq_known_received {
            self.max_send_seq_known_received = highest;
        }

        if missing.is_empty() {
            // A bare leading ack confirms everything at or below it but
            // says nothing about newer in-flight frames.
            let confirmed: Vec<SequenceNumber> =
                self.sent.range(..=highest).map(|(&seq, _)| seq).collect();
            for seq in confirmed {
                self.confirm_sent(seq);
            }
        } else {
            let entries = mem::take(&mut self.sent);
            for (seq, entry) in entries {
                if seq > highest || missing.contains(&seq) {
                    self.lost.insert(seq, entry.payload);
                } else if let Some(attached) = entry.ack_attached {
                    if attached > self.max_send_ack_known_received {
                        self.max_send_ack_known_received = attached;
                    }
                }
            }
            debug!(
                "peer reported {} missing frame(s), {} now marked lost",
                missing.len(),
                self.lost.len()
            );
        }
    }

    fn confirm_sent(&mut self, seq: SequenceNumber) {
        if let Some(entry) = self.sent.remove(&seq) {
            if let Some(attached) = entry.ack_attached {
                if attached > self.max_send_ack_known_received {
                    self.max_send_ack_known_received = attached;
                }
            }
        }
    }

    /// Sequences one frame's payload, emitting it in its classification.
    fn sequence_payload(
        &mut self,
        wire_seq: u16,
        payload: Vec<u8>,
        out: &mut Vec<ReceivedMessage>,
    ) {
        if wire_seq == 0 {
            // Ack-only frames have no payload. A payload on sequence 0 is
            // the pre-session error path and bypasses ordering.
            if !payload.is_empty() {
                out.push(ReceivedMessage::Unordered(payload));
            }
            return;
        }

        let seq = self.correct_seq(wire_seq);
        if seq <= self.max_emitted_seq || self.received.contains_key(&seq) {
            debug!("dropping duplicate frame, seq {seq}");
        } else if seq == self.max_emitted_seq + 1 {
            self.max_emitted_seq = seq;
            out.push(ReceivedMessage::Full(payload));
            if seq > self.max_inc_seq {
                self.max_inc_seq = seq;
            }
            // release anything this arrival unblocked
            while let Some(next) = self.received.remove(&(self.max_emitted_seq + 1)) {
                self.max_emitted_seq += 1;
                out.push(ReceivedMessage::Ordered(next));
            }
        } else {
            if seq > self.max_inc_seq {
                self.max_inc_seq = seq;
            }
            out.push(ReceivedMessage::Unordered(payload.clone()));
            self.received.insert(seq, payload);
        }
        self.settle_transition();
    }

    /// Projects a wire sequence number back onto the unbounded counter,
    /// opening a rollover window when a low value arrives while the
    /// ordered stream sits near the top of the current cycle.
    fn correct_seq(&mut self, wire_seq: u16) -> SequenceNumber {
        let seq_max = self.seq_max();
        let wire = wire_seq as u64;
        let window_pos = self.max_emitted_seq - self.rec_seq_offset * seq_max;
        if wire < sequence::lower_threshold(seq_max)
            && window_pos > sequence::upper_threshold(seq_max)
        {
            self.in_transition = true;
            wire + (self.rec_seq_offset + 1) * seq_max
        } else {
            wire + self.rec_seq_offset * seq_max
        }
    }

    /// Closes the rollover window once the ordered stream has fully moved
    /// into the new cycle.
    fn settle_transition(&mut self) {
        let seq_max = self.seq_max();
        if self.in_transition && self.max_emitted_seq - self.rec_seq_offset * seq_max > seq_max {
            self.rec_seq_offset += 1;
            self.in_transition = false;
        }
    }

    /// Projects a wire ack onto the unbounded counter. Anchored just below
    /// the oldest sequence number that could still be usefully acked.
    fn correct_ack(&self, wire_ack: u16, base: SequenceNumber) -> SequenceNumber {
        let seq_max = self.seq_max();
        let mut ack = wire_ack as u64 + (base / seq_max) * seq_max;
        if ack <= base {
            ack += seq_max;
        }
        // a peer cannot have received what was never sent
        while ack > self.max_send_seq && ack > seq_max {
            ack -= seq_max;
        }
        if ack > self.max_send_seq {
            warn!(
                "peer acked seq {ack} but only {} were sent",
                self.max_send_seq
            );
        }
        ack
    }

    fn ack_base(&self) -> SequenceNumber {
        let oldest_outstanding = match (
            self.sent.keys().next().copied(),
            self.lost.keys().next().copied(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        match oldest_outstanding {
            Some(seq) => seq - 1,
            None => self.max_send_seq_known_received,
        }
    }

    fn should_auto_ack(&self) -> bool {
        if let Some(after) = self.config.auto_ack_after_messages {
            if self.max_inc_seq - self.max_send_ack >= after {
                return true;
            }
        }
        if let Some(failed) = self.config.auto_ack_on_failed_messages {
            if self.failed_receive_message_count() >= failed {
                return true;
            }
        }
        false
    }

    // Snapshots

    /// Serializes all counters and buffers into an opaque string.
    ///
    /// The [`DeliveryConfig`] is not part of the snapshot; restore with a
    /// config whose `seq_max` matches the one in effect at capture time.
    pub fn save_state(&self) -> Result<String, StateError> {
        let snapshot = EngineSnapshot {
            max_send_seq: self.max_send_seq,
            max_send_seq_known_received: self.max_send_seq_known_received,
            max_send_ack: self.max_send_ack,
            max_send_ack_known_received: self.max_send_ack_known_received,
            max_inc_seq: self.max_inc_seq,
            max_emitted_seq: self.max_emitted_seq,
            rec_seq_offset: self.rec_seq_offset,
            in_transition: self.in_transition,
            sent: self
                .sent
                .iter()
                .map(|(&seq, entry)| {
                    (seq, (ByteBuf::from(entry.payload.clone()), entry.ack_attached))
                })
                .collect(),
            lost: self
                .lost
                .iter()
                .map(|(&seq, payload)| (seq, ByteBuf::from(payload.clone())))
                .collect(),
            received: self
                .received
                .iter()
                .map(|(&seq, payload)| (seq, ByteBuf::from(payload.clone())))
                .collect(),
        };
        encode_state(&snapshot)
    }

    /// Rebuilds an engine from [`save_state`](Self::save_state) output.
    pub fn restore_state(config: DeliveryConfig, state: &str) -> Result<Self, StateError> {
        let snapshot: EngineSnapshot = decode_state(state)?;
        Ok(Self {
            config,
            max_send_seq: snapshot.max_send_seq,
            max_send_seq_known_received: snapshot.max_send_seq_known_received,
            max_send_ack: snapshot.max_send_ack,
            max_send_ack_known_received: snapshot.max_send_ack_known_received,
            max_inc_seq: snapshot.max_inc_seq,
            max_emitted_seq: snapshot.max_emitted_seq,
            rec_seq_offset: snapshot.rec_seq_offset,
            in_transition: snapshot.in_transition,
            sent: snapshot
                .sent
                .into_iter()
                .map(|(seq, (payload, ack_attached))| {
                    (
                        seq,
                        SentEntry {
                            payload: payload.into_vec(),
                            ack_attached,
                        },
                    )
                })
                .collect(),
            lost: snapshot
                .lost
                .into_iter()
                .map(|(seq, payload)| (seq, payload.into_vec()))
                .collect(),
            received: snapshot
                .received
                .into_iter()
                .map(|(seq, payload)| (seq, payload.into_vec()))
                .collect(),
        })
    }
}
