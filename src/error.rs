use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors crossing the transport boundary. Anything here is fatal for the
/// run: retrying a timing measurement would corrupt its latency semantics.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("transport closed by peer")]
    Closed,

    #[error("completion for packet {id} reported status {status}")]
    Completion { id: u32, status: i32 },
}

/// Errors from the persistence engine. The run cannot silently measure into
/// a void, so these terminate it at the point of failure.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not open output file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("could not write measurement: {0}")]
    Write(#[source] io::Error),

    #[error("could not flush and close output: {0}")]
    Close(#[source] io::Error),
}

/// Run-level failure of a pingpong experiment.
#[derive(Debug, Error)]
pub enum PingpongError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("sender task failed: {0}")]
    Sender(String),

    #[error("{0} consecutive out-of-phase packets, aborting")]
    PhaseErrorStorm(u32),
}
