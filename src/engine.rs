use crate::cancel::CancelToken;
use crate::clock;
use crate::error::{PingpongError, TransportError};
use crate::persist::{Reducer, WriteOutcome};
use crate::report::RunReporter;
use crate::sender::{PacedSender, SenderOptions};
use crate::transport::{PacketRx, PacketTx, Poll};
use spdlog::{error, info, warn};
use std::hint::spin_loop;

/// Consecutive out-of-phase packets tolerated before a run is declared
/// pathological and aborted.
const MAX_PHASE_ERRORS: u32 = 64;

pub struct ClientOptions {
    /// Round trips to measure. Must be positive.
    pub iters: u32,
    /// Nominal gap between outbound packets, nanoseconds. Must be positive.
    pub interval_ns: u64,
    /// Acceptable pacing error, percent of the interval.
    pub max_err_pct: u64,
    /// Pin the poll loop and the sender to separate cores.
    pub pin_cores: bool,
    /// Rounds between progress log lines.
    pub report_interval: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            iters: 0,
            interval_ns: 0,
            max_err_pct: 5,
            pin_cores: false,
            report_interval: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// Packets the pacing task actually emitted.
    pub sent: u32,
    /// Rounds folded into the reducer output.
    pub recorded: u64,
    /// Rounds skipped as anomalies (by phase checks or by the reducer).
    pub skipped: u64,
}

fn pin_to(index: usize) {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        return;
    };
    if let Some(core_id) = core_ids.get(index % core_ids.len()) {
        core_affinity::set_for_current(*core_id);
    }
}

fn sender_core(pin_cores: bool) -> Option<core_affinity::CoreId> {
    if !pin_cores {
        return None;
    }
    let core_ids = core_affinity::get_core_ids()?;
    core_ids.get(1 % core_ids.len()).copied()
}

/// Client role: the pacing task emits phase-0 payloads while this loop polls
/// for phase-2 echoes, stamps `ts[3]`, and feeds the reducer.
///
/// Terminates once the high-water id mark reaches `iters`, on cancellation,
/// or on a fatal error. On every exit path the sender is cancelled and
/// joined and the reducer is closed exactly once.
pub fn run_client<Tx, Rx>(
    tx: Tx,
    mut rx: Rx,
    mut reducer: Reducer,
    options: &ClientOptions,
    cancel: &CancelToken,
) -> Result<ClientStats, PingpongError>
where
    Tx: PacketTx + Send + 'static,
    Rx: PacketRx,
{
    assert!(options.iters > 0, "iters must be greater than 0");
    assert!(options.interval_ns > 0, "interval must be greater than 0");

    if options.pin_cores {
        pin_to(0);
    }
    let sender = PacedSender::spawn(
        tx,
        SenderOptions {
            iters: options.iters,
            interval_ns: options.interval_ns,
            max_err_pct: options.max_err_pct,
            pin_core: sender_core(options.pin_cores),
        },
        cancel.clone(),
    );

    let mut reporter = RunReporter::new("client", options.report_interval, 8);
    let mut current_id = 0u32;
    let mut recorded = 0u64;
    let mut skipped = 0u64;
    let mut phase_errors = 0u32;

    let outcome: Result<(), PingpongError> = loop {
        if cancel.is_stopped() || current_id >= options.iters {
            break Ok(());
        }

        if let Err(e) = rx.poll_timestamp_completions() {
            break Err(e.into());
        }

        match rx.poll() {
            Ok(Poll::NotReady) => {
                spin_loop();
            }
            Ok(Poll::Closed) => break Err(TransportError::Closed.into()),
            Ok(Poll::Ready(mut payload)) => {
                if payload.phase != 2 {
                    warn!(
                        "packet {}: expected phase 2, got {}, dropping round",
                        payload.id, payload.phase
                    );
                    skipped += 1;
                    phase_errors += 1;
                    if phase_errors >= MAX_PHASE_ERRORS {
                        break Err(PingpongError::PhaseErrorStorm(phase_errors));
                    }
                    continue;
                }
                phase_errors = 0;

                payload.ts[3] = clock::monotonic_ns();
                match reducer.write(&payload) {
                    Ok(WriteOutcome::Recorded) => recorded += 1,
                    Ok(WriteOutcome::WarmUp) => {}
                    Ok(WriteOutcome::Skipped) => skipped += 1,
                    Err(e) => break Err(e.into()),
                }
                if let Some(rtt) = payload.latency_ns() {
                    reporter.record(rtt);
                }
                // High-water mark: out-of-order arrivals never roll it back.
                current_id = current_id.max(payload.id);
            }
            Err(e) => break Err(e.into()),
        }
    };

    if let Err(e) = &outcome {
        error!("client run aborting: {e}");
    }

    let sender_outcome = sender.cancel_and_join();
    reporter.finish();
    reducer.close()?;

    outcome?;
    let sent = sender_outcome?;
    Ok(ClientStats {
        sent,
        recorded,
        skipped,
    })
}

/// Server role: poll for phase-0 payloads, stamp the RX and TX timestamps,
/// flip to phase 2, and echo back. Returns the number of rounds echoed.
pub fn run_server<Tx, Rx>(
    mut tx: Tx,
    mut rx: Rx,
    iters: u32,
    pin_cores: bool,
    cancel: &CancelToken,
) -> Result<u64, PingpongError>
where
    Tx: PacketTx,
    Rx: PacketRx,
{
    assert!(iters > 0, "iters must be greater than 0");

    if pin_cores {
        pin_to(0);
    }

    let mut current_id = 0u32;
    let mut echoed = 0u64;
    let mut phase_errors = 0u32;

    while current_id < iters && !cancel.is_stopped() {
        rx.poll_timestamp_completions()?;

        let mut payload = match rx.poll()? {
            Poll::NotReady => {
                spin_loop();
                continue;
            }
            Poll::Closed => return Err(TransportError::Closed.into()),
            Poll::Ready(payload) => payload,
        };

        if payload.phase != 0 {
            // Never mutate an out-of-phase payload as if it were a ping.
            warn!(
                "packet {}: expected phase 0, got {}, dropping round",
                payload.id, payload.phase
            );
            phase_errors += 1;
            if phase_errors >= MAX_PHASE_ERRORS {
                return Err(PingpongError::PhaseErrorStorm(phase_errors));
            }
            continue;
        }
        phase_errors = 0;

        payload.ts[1] = clock::monotonic_ns();
        current_id = current_id.max(payload.id);
        payload.phase = 2;
        payload.ts[2] = clock::monotonic_ns();
        tx.send(&payload).map_err(PingpongError::Transport)?;
        echoed += 1;
    }

    info!("server done after {echoed} rounds, high-water id {current_id}");
    Ok(echoed)
}
