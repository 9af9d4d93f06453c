use crate::error::TransportError;
use crate::payload::PingpongPayload;

/// Outcome of one receive poll. `NotReady` is not an error; the caller picks
/// its own retry strategy (spin, hybrid sleep-spin, or blocking wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Ready(PingpongPayload),
    NotReady,
    Closed,
}

/// Transmit half of a transport. The engine hands it a fully stamped payload
/// and the transport owns framing and delivery.
pub trait PacketTx {
    fn send(&mut self, payload: &PingpongPayload) -> Result<(), TransportError>;
}

/// Receive half of a transport. Malformed frames (wrong size, wrong
/// discriminator) are dropped inside the implementation and never surface.
pub trait PacketRx {
    fn poll(&mut self) -> Result<Poll, TransportError>;

    /// Drains pending send-side completions for transports that acknowledge
    /// transmissions through a separate completion queue. A non-success
    /// completion status is fatal. Default: nothing to drain.
    fn poll_timestamp_completions(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
