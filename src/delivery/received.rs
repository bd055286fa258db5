/// A message surfaced by [`DeliveryEngine::receive_messages`], tagged with
/// how it arrived relative to the ordered stream.
///
/// [`DeliveryEngine::receive_messages`]: crate::DeliveryEngine::receive_messages
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceivedMessage {
    /// Arrived in order and was released immediately. Both the ordered and
    /// the unordered view see it now, for the first time.
    Full(Vec<u8>),
    /// Released from the reorder buffer by a later arrival. The unordered
    /// view has already seen this payload.
    Ordered(Vec<u8>),
    /// Arrived ahead of a gap. Surfaced right away for the unordered view;
    /// the same payload comes back as [`ReceivedMessage::Ordered`] once the
    /// gap closes.
    Unordered(Vec<u8>),
}

impl ReceivedMessage {
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Full(p) | Self::Ordered(p) | Self::Unordered(p) => p,
        }
    }

    /// True when the payload has not reached the ordered stream yet.
    pub fn is_unordered(&self) -> bool {
        matches!(self, Self::Unordered(_))
    }
}

/// Everything one [`receive_messages`] call produced.
///
/// [`receive_messages`]: crate::DeliveryEngine::receive_messages
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceivedBatch {
    /// Frames the engine wants on the wire now: automatic retransmissions
    /// first, then at most one ack-only frame.
    pub to_send: Vec<Vec<u8>>,
    /// Payloads surfaced by this batch, in emission order.
    pub messages: Vec<ReceivedMessage>,
}
