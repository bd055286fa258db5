/// Tunables for a [`DeliveryEngine`](crate::DeliveryEngine).
///
/// Both peers of a channel must agree on `seq_max`.
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Largest sequence number that fits on the wire before wrapping.
    pub seq_max: u16,
    /// Re-encode frames reported lost as soon as the loss is detected,
    /// instead of waiting for an explicit
    /// [`send_failed_messages`](crate::DeliveryEngine::send_failed_messages)
    /// call.
    pub auto_retransmit: bool,
    /// Emit an ack-only frame once this many received messages have not
    /// been acked yet.
    pub auto_ack_after_messages: Option<u64>,
    /// Emit an ack-only frame once this many gaps are outstanding on the
    /// receive side.
    pub auto_ack_on_failed_messages: Option<u64>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            seq_max: u16::MAX,
            auto_retransmit: false,
            auto_ack_after_messages: None,
            auto_ack_on_failed_messages: None,
        }
    }
}
