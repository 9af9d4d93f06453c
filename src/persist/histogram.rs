use crate::payload::PingpongPayload;
use crate::persist::WriteOutcome;
use crate::persist::counters::CounterArray;
use spdlog::warn;
use std::io::{self, Write};

/// Buckets per counter array.
pub const NUM_BUCKETS: usize = 20_000;
/// Half-width of the relative-latency window around the send interval, ns.
pub const OFFSET_NS: u64 = 1_000_000;

/// Equal-width bucket assignment over `[lo, hi)`. Every value inside the
/// window gets an index in `[0, NUM_BUCKETS)` even when the span does not
/// divide evenly; values outside have no bucket.
pub fn bucket_index(value: u64, lo: u64, hi: u64) -> Option<usize> {
    if value < lo || value >= hi {
        return None;
    }
    let span = (hi - lo) as u128;
    Some(((value - lo) as u128 * NUM_BUCKETS as u128 / span) as usize)
}

/// Five fixed counter arrays: consecutive-delta distributions per timestamp
/// and the absolute RTT distribution. One payload of state, O(1) per write.
pub(crate) struct HistogramBins {
    rel_lo: u64,
    rel_hi: u64,
    abs_hi: u64,
    rel: [CounterArray; 4],
    abs: CounterArray,
    prev: Option<PingpongPayload>,
}

impl HistogramBins {
    pub(crate) fn new(send_interval_ns: u64) -> Self {
        // The relative window always spans 2*OFFSET; for intervals shorter
        // than the offset it is anchored at zero instead of going negative.
        let rel_lo = send_interval_ns.saturating_sub(OFFSET_NS);
        Self {
            rel_lo,
            rel_hi: rel_lo + 2 * OFFSET_NS,
            abs_hi: send_interval_ns + 2 * OFFSET_NS,
            rel: std::array::from_fn(|_| CounterArray::new(NUM_BUCKETS)),
            abs: CounterArray::new(NUM_BUCKETS),
            prev: None,
        }
    }

    pub(crate) fn record(&mut self, payload: &PingpongPayload) -> WriteOutcome {
        // The delta base advances on every call, anomalous or not, so one
        // bad round cannot poison the next one's deltas.
        let Some(prev) = self.prev.replace(*payload) else {
            return WriteOutcome::WarmUp;
        };

        // All four deltas must land in the window before any relative
        // counter is touched; one stray delta skips the whole relative
        // round.
        let mut rel_idx = [0usize; 4];
        let mut rel_ok = true;
        for i in 0..4 {
            let delta = payload.ts[i].checked_sub(prev.ts[i]);
            match delta.and_then(|d| bucket_index(d, self.rel_lo, self.rel_hi)) {
                Some(idx) => rel_idx[i] = idx,
                None => {
                    warn!(
                        "packet {}: ts[{i}] delta {delta:?} outside [{}, {}), skipping relative round",
                        payload.id, self.rel_lo, self.rel_hi
                    );
                    rel_ok = false;
                    break;
                }
            }
        }
        if rel_ok {
            for (i, idx) in rel_idx.into_iter().enumerate() {
                self.rel[i][idx] += 1;
            }
        }

        // The absolute latency is binned independently of the relative
        // round.
        match payload
            .latency_ns()
            .and_then(|latency| bucket_index(latency, 0, self.abs_hi))
        {
            Some(idx) => self.abs[idx] += 1,
            None => warn!(
                "packet {}: absolute latency outside [0, {})",
                payload.id, self.abs_hi
            ),
        }

        if rel_ok {
            WriteOutcome::Recorded
        } else {
            WriteOutcome::Skipped
        }
    }

    /// The full histogram table: one `rel0 rel1 rel2 rel3 abs` row per
    /// bucket, in ascending bucket order.
    pub(crate) fn finish<W: Write>(self, out: &mut W) -> io::Result<()> {
        for b in 0..NUM_BUCKETS {
            writeln!(
                out,
                "{} {} {} {} {}",
                self.rel[0][b], self.rel[1][b], self.rel[2][b], self.rel[3][b], self.abs[b]
            )?;
        }
        Ok(())
    }
}
