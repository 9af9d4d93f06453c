mod cancel;
pub mod clock;
mod engine;
mod error;
mod pacing;
mod payload;
mod persist;
mod report;
mod ring;
mod sender;
mod transport;
mod udp;

pub use crate::cancel::CancelToken;
pub use crate::engine::{ClientOptions, ClientStats, run_client, run_server};
pub use crate::error::{PersistError, PingpongError, TransportError};
pub use crate::pacing::{sleep_ns, spin_threshold};
pub use crate::payload::{PAYLOAD_SIZE, PingpongPayload};
pub use crate::persist::{NUM_BUCKETS, OFFSET_NS, Reducer, ReducerMode, WriteOutcome, bucket_index};
pub use crate::report::RunReporter;
pub use crate::ring::{RingConsumer, RingProducer, ring};
pub use crate::sender::{PacedSender, SenderOptions};
pub use crate::transport::{PacketRx, PacketTx, Poll};
pub use crate::udp::{UdpRx, UdpTransport, UdpTx};
