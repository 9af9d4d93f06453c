mod counters;
mod histogram;
mod min_max;

pub use self::histogram::{NUM_BUCKETS, OFFSET_NS, bucket_index};

use self::histogram::HistogramBins;
use self::min_max::MinMax;
use crate::error::PersistError;
use crate::payload::PingpongPayload;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Which reduction a run persists. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerMode {
    /// One raw line per completed round.
    AllTimestamps,
    /// Running min/max, emitted on close.
    MinMax,
    /// Fixed-bucket latency histograms; bucket bounds derive from the
    /// nominal send interval.
    Histogram { send_interval_ns: u64 },
}

/// What a single `write` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload entered the statistics (or the log).
    Recorded,
    /// First histogram payload, cached as the delta base; nothing counted
    /// yet.
    WarmUp,
    /// Anomalous round, logged and left out of (part of) the statistics.
    Skipped,
}

enum Kind {
    AllTimestamps,
    MinMax(MinMax),
    Histogram(HistogramBins),
}

/// The persistence engine: folds completed payloads into durable statistics
/// with O(1) memory regardless of run length.
///
/// Owns its output stream exclusively. `close` consumes the reducer, so a
/// second close, or a write after close, is a compile error rather than a
/// runtime one.
pub struct Reducer {
    out: BufWriter<Box<dyn Write + Send>>,
    kind: Kind,
}

impl Reducer {
    /// A reducer writing to `path`, or to stdout when `path` is `None`.
    pub fn create(mode: ReducerMode, path: Option<&Path>) -> Result<Self, PersistError> {
        let out: Box<dyn Write + Send> = match path {
            Some(p) => Box::new(File::create(p).map_err(|source| PersistError::Open {
                path: p.to_path_buf(),
                source,
            })?),
            None => Box::new(io::stdout()),
        };
        Ok(Self::with_writer(mode, out))
    }

    pub fn with_writer(mode: ReducerMode, out: Box<dyn Write + Send>) -> Self {
        let kind = match mode {
            ReducerMode::AllTimestamps => Kind::AllTimestamps,
            ReducerMode::MinMax => Kind::MinMax(MinMax::new()),
            ReducerMode::Histogram { send_interval_ns } => {
                Kind::Histogram(HistogramBins::new(send_interval_ns))
            }
        };
        Self {
            out: BufWriter::new(out),
            kind,
        }
    }

    /// Folds one completed payload into the statistics. O(1) time, and
    /// allocation-free for the MinMax and Histogram variants.
    pub fn write(&mut self, payload: &PingpongPayload) -> Result<WriteOutcome, PersistError> {
        match &mut self.kind {
            Kind::AllTimestamps => {
                writeln!(
                    self.out,
                    "{}: {} {} {} {}",
                    payload.id, payload.ts[0], payload.ts[1], payload.ts[2], payload.ts[3]
                )
                .map_err(PersistError::Write)?;
                Ok(WriteOutcome::Recorded)
            }
            Kind::MinMax(state) => Ok(state.record(payload)),
            Kind::Histogram(state) => Ok(state.record(payload)),
        }
    }

    /// Emits any retained summary, flushes, and releases the output stream.
    pub fn close(mut self) -> Result<(), PersistError> {
        match self.kind {
            Kind::AllTimestamps => {}
            Kind::MinMax(state) => state.finish(&mut self.out).map_err(PersistError::Write)?,
            Kind::Histogram(state) => state.finish(&mut self.out).map_err(PersistError::Write)?,
        }
        self.out.flush().map_err(PersistError::Close)
    }
}
