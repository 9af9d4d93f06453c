use crate::payload::PingpongPayload;
use crate::persist::WriteOutcome;
use spdlog::warn;
use std::io::{self, Write};

/// Running min/max of the RTT estimate, with a snapshot of the payload
/// behind each extreme. Retains at most two payload copies for the whole
/// run.
pub(crate) struct MinMax {
    min: u64,
    max: u64,
    min_payload: PingpongPayload,
    max_payload: PingpongPayload,
}

impl MinMax {
    pub(crate) fn new() -> Self {
        Self {
            min: u64::MAX,
            max: 0,
            min_payload: PingpongPayload::empty(),
            max_payload: PingpongPayload::empty(),
        }
    }

    pub(crate) fn record(&mut self, payload: &PingpongPayload) -> WriteOutcome {
        let Some(latency) = payload.latency_ns() else {
            warn!("packet {}: latency estimate underflowed, skipping", payload.id);
            return WriteOutcome::Skipped;
        };
        // Strict comparisons: the first occurrence of an extreme is the one
        // retained.
        if latency < self.min {
            self.min = latency;
            self.min_payload = *payload;
        }
        if latency > self.max {
            self.max = latency;
            self.max_payload = *payload;
        }
        WriteOutcome::Recorded
    }

    /// Up to two lines (min record, max record); an extreme whose sentinel
    /// was never beaten is not emitted.
    pub(crate) fn finish<W: Write>(self, out: &mut W) -> io::Result<()> {
        if self.min != u64::MAX {
            write_extreme(out, &self.min_payload, self.min)?;
        }
        if self.max != 0 {
            write_extreme(out, &self.max_payload, self.max)?;
        }
        Ok(())
    }
}

fn write_extreme<W: Write>(out: &mut W, p: &PingpongPayload, latency: u64) -> io::Result<()> {
    writeln!(
        out,
        "{}: {} {} {} {} (LATENCY {} ns)",
        p.id, p.ts[0], p.ts[1], p.ts[2], p.ts[3], latency
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with_rtt(id: u32, rtt: u64) -> PingpongPayload {
        let mut p = PingpongPayload::new(id);
        p.phase = 2;
        p.ts = [0, 0, 0, rtt];
        p
    }

    #[test]
    fn test_tracks_first_occurrence_of_extremes() {
        let mut state = MinMax::new();
        for (id, rtt) in [(1, 100), (2, 50), (3, 200), (4, 50)] {
            assert_eq!(state.record(&payload_with_rtt(id, rtt)), WriteOutcome::Recorded);
        }

        assert_eq!(state.min, 50);
        assert_eq!(state.max, 200);
        assert_eq!(state.min_payload.id, 2);
        assert_eq!(state.max_payload.id, 3);

        let mut out = Vec::new();
        state.finish(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "2: 0 0 0 50 (LATENCY 50 ns)");
        assert_eq!(lines[1], "3: 0 0 0 200 (LATENCY 200 ns)");
    }

    #[test]
    fn test_untouched_sentinels_emit_nothing() {
        let state = MinMax::new();
        let mut out = Vec::new();
        state.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_drifted_payload_is_skipped() {
        let mut state = MinMax::new();
        let mut p = PingpongPayload::new(1);
        p.ts = [100, 1_000, 2_000, 200];
        assert_eq!(state.record(&p), WriteOutcome::Skipped);
        assert_eq!(state.min, u64::MAX);
        assert_eq!(state.max, 0);
    }
}
