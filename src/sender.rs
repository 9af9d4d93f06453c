use crate::cancel::CancelToken;
use crate::clock;
use crate::error::{PingpongError, TransportError};
use crate::pacing;
use crate::payload::PingpongPayload;
use crate::transport::PacketTx;
use spdlog::info;
use std::thread::{self, JoinHandle};

pub struct SenderOptions {
    pub iters: u32,
    pub interval_ns: u64,
    pub max_err_pct: u64,
    pub pin_core: Option<core_affinity::CoreId>,
}

/// Background task emitting one phase-0 payload every `interval_ns`
/// nanoseconds, ids `1..=iters`. Runs on its own thread so the main flow can
/// poll for completions in parallel; the only channel between the two is the
/// transport itself.
pub struct PacedSender {
    handle: JoinHandle<Result<u32, TransportError>>,
    cancel: CancelToken,
}

impl PacedSender {
    pub fn spawn<T>(mut tx: T, options: SenderOptions, cancel: CancelToken) -> Self
    where
        T: PacketTx + Send + 'static,
    {
        assert!(options.iters > 0, "iters must be greater than 0");
        assert!(options.interval_ns > 0, "interval must be greater than 0");

        let token = cancel.clone();
        let handle = thread::spawn(move || {
            if let Some(core_id) = options.pin_core {
                core_affinity::set_for_current(core_id);
            }
            send_loop(&mut tx, &options, &token)
        });

        Self { handle, cancel }
    }

    /// Requests stop and joins. Safe to call at any point of the pacing
    /// loop; the sender owns its outbound buffer exclusively, so no partial
    /// write can be left behind.
    pub fn cancel_and_join(self) -> Result<u32, PingpongError> {
        self.cancel.request_stop();
        self.join()
    }

    /// Joins the sender and reports how many packets it actually sent. A
    /// send failure stops the loop early and surfaces here; already-sent
    /// packets are never retried.
    pub fn join(self) -> Result<u32, PingpongError> {
        match self.handle.join() {
            Ok(Ok(sent)) => Ok(sent),
            Ok(Err(e)) => Err(PingpongError::Transport(e)),
            Err(_) => Err(PingpongError::Sender("sender thread panicked".into())),
        }
    }
}

fn send_loop<T: PacketTx>(
    tx: &mut T,
    options: &SenderOptions,
    cancel: &CancelToken,
) -> Result<u32, TransportError> {
    let mut sent = 0u32;
    for id in 1..=options.iters {
        if cancel.is_stopped() {
            break;
        }

        let round_start = clock::monotonic_ns();
        let mut payload = PingpongPayload::new(id);
        payload.ts[0] = clock::monotonic_ns();
        tx.send(&payload)?;
        sent += 1;

        // Pace against the round start so the send itself eats into the
        // interval rather than stretching it.
        let elapsed = clock::monotonic_ns() - round_start;
        if elapsed < options.interval_ns {
            pacing::sleep_ns(options.interval_ns - elapsed, options.max_err_pct);
        }
    }
    info!("sender done after {sent} packets");
    Ok(sent)
}
