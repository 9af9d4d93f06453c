use bytemuck::{Pod, Zeroable};

/// On-wire size of a payload. Frames of any other length are dropped at the
/// transport boundary.
pub const PAYLOAD_SIZE: usize = size_of::<PingpongPayload>();

const PINGPONG_MAGIC: u32 = 0x8bad_beef;

/// The four-timestamp pingpong record carried by every packet.
///
/// `ts[0]` is the client PING TX timestamp, `ts[1]` the server PING RX,
/// `ts[2]` the server PONG TX, `ts[3]` the client PONG RX. A zero-filled
/// slot (a polling placeholder) never has the magic set and is therefore
/// never mistaken for data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PingpongPayload {
    pub id: u32,
    pub phase: u32,
    pub ts: [u64; 4],
    magic: u32,
    _pad: u32,
}

impl PingpongPayload {
    /// A phase-0 payload with all timestamps unset.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            phase: 0,
            ts: [0; 4],
            magic: PINGPONG_MAGIC,
            _pad: 0,
        }
    }

    /// A zeroed placeholder, as found in an unwritten ring slot.
    pub fn empty() -> Self {
        Self::zeroed()
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PINGPONG_MAGIC
    }

    /// Round-trip time minus the peer's hold time, the offset-free RTT
    /// estimator. Both terms are differences on a single host's clock, so
    /// clock offset cancels; relative drift does not. Returns `None` when
    /// drift makes the hold time exceed the measured round trip.
    pub fn latency_ns(&self) -> Option<u64> {
        let round_trip = self.ts[3].checked_sub(self.ts[0])?;
        let peer_hold = self.ts[2].checked_sub(self.ts[1])?;
        round_trip.checked_sub(peer_hold)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Decodes a payload from the first `PAYLOAD_SIZE` bytes of a frame.
    /// Returns `None` for short frames.
    pub fn read_from(frame: &[u8]) -> Option<Self> {
        let bytes = frame.get(..PAYLOAD_SIZE)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_size() {
        assert_eq!(PAYLOAD_SIZE, 48);
    }

    #[test]
    fn test_placeholder_is_invalid() {
        assert!(!PingpongPayload::empty().is_valid());
        assert!(PingpongPayload::new(1).is_valid());
    }

    #[test]
    fn test_new_payload_starts_phase_zero() {
        let p = PingpongPayload::new(7);
        assert_eq!(p.id, 7);
        assert_eq!(p.phase, 0);
        assert_eq!(p.ts, [0; 4]);
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut p = PingpongPayload::new(42);
        p.phase = 2;
        p.ts = [10, 20, 30, 40];

        let decoded = PingpongPayload::read_from(p.as_bytes()).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_short_frame_rejected() {
        let p = PingpongPayload::new(1);
        assert!(PingpongPayload::read_from(&p.as_bytes()[..PAYLOAD_SIZE - 1]).is_none());
    }

    #[test]
    fn test_latency_estimator() {
        let mut p = PingpongPayload::new(1);
        p.ts = [100, 1_000, 1_050, 400];
        // (400 - 100) - (1050 - 1000)
        assert_eq!(p.latency_ns(), Some(250));
    }

    #[test]
    fn test_latency_detects_drift() {
        let mut p = PingpongPayload::new(1);
        // Hold time longer than the whole round trip: drifted clocks.
        p.ts = [100, 1_000, 2_000, 200];
        assert_eq!(p.latency_ns(), None);
    }
}
