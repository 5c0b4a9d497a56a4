//! Error types for mpitrace

use crate::resolver::PendingKey;
use crate::types::{Handle, HandleKind, Rank, Tick};
use std::fmt;
use thiserror::Error;

/// Errors raised by a [`crate::registry::HandleRegistry`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The most recent entry for this handle has not been freed
    #[error("handle {0} is still active")]
    HandleStillActive(Handle),

    /// No entry was ever created for this handle
    #[error("handle {0} was never created")]
    HandleNotFound(Handle),

    /// The most recent entry for this handle is already freed
    #[error("handle {0} is already closed")]
    AlreadyClosed(Handle),

    /// Commit on a handle whose most recent entry is freed
    #[error("handle {0} is closed")]
    HandleClosed(Handle),

    /// The handle exists but has no open entry
    #[error("handle {0} is not active")]
    HandleNotActive(Handle),

    /// No entry for this handle covers the requested tick
    #[error("handle {handle} has no entry at tick {at}")]
    NoEntryAtTime { handle: Handle, at: Tick },
}

/// Errors raised while decoding or encoding a trace stream
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("bad magic at offset {offset}")]
    BadMagic { offset: u64 },

    #[error("unsupported trace version {version}")]
    UnsupportedVersion { version: u16 },

    #[error("record truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("unknown call tag {tag:#06x} at offset {offset}")]
    UnknownTag { tag: u16, offset: u64 },

    #[error("invalid utf-8 string at offset {offset}")]
    BadString { offset: u64 },

    #[error("{what} too long to encode ({len})")]
    TooLong { what: &'static str, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid arguments to a group derivation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("rank {rank} out of range for group of size {size}")]
    RankOutOfRange { rank: i32, size: usize },

    #[error("rank {0} listed more than once")]
    DuplicateRank(i32),

    #[error("range stride of zero")]
    ZeroStride,
}

/// Why a rank's stream could not be replayed
#[derive(Error, Debug)]
pub enum RankFault {
    #[error("{kind} {source}")]
    Handle {
        kind: HandleKind,
        #[source]
        source: HandleError,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("invalid datatype arguments: {0}")]
    InvalidTypeArgs(String),

    #[error("collective creation on thread {thread}, rank runs on thread {main}")]
    MultiThreadedCollective { thread: u16, main: u16 },
}

/// Where a rank that never contributed to a stalled collective ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingState {
    /// The rank reached the end of its stream (or its truncation point)
    Finished,
    /// The rank is itself waiting on another collective
    Blocked(PendingKey),
}

/// One pending collective that can never complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledCollective {
    pub key: PendingKey,
    pub expected: usize,
    pub arrived: Vec<Rank>,
    pub missing: Vec<(Rank, MissingState)>,
}

impl fmt::Display for StalledCollective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} of {} arrived: {:?}",
            self.key,
            self.arrived.len(),
            self.expected,
            self.arrived
        )?;
        for (rank, state) in &self.missing {
            match state {
                MissingState::Finished => write!(f, "; rank {rank} finished without joining")?,
                MissingState::Blocked(key) => write!(f, "; rank {rank} blocked on {key}")?,
            }
        }
        write!(f, ")")
    }
}

fn list_stalled(stalled: &[StalledCollective]) -> String {
    stalled
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal errors of the first (resolution) pass
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("rank {rank} corrupt at offset {offset}: {fault}")]
    RankCorrupt {
        rank: Rank,
        offset: u64,
        #[source]
        fault: RankFault,
    },

    #[error("rank {rank} cannot contribute to {key}: {reason}")]
    UnmatchedCollective {
        rank: Rank,
        key: PendingKey,
        reason: String,
    },

    #[error("rank {rank} disagrees with other participants of {key}: {reason}")]
    CollectiveMismatch {
        rank: Rank,
        key: PendingKey,
        reason: String,
    },

    #[error("trace {index} was written by rank {found}")]
    RankMismatch { index: usize, found: Rank },

    #[error("deadlock: {}", list_stalled(.stalled))]
    Deadlock { stalled: Vec<StalledCollective> },
}

/// Errors raised by an output sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rank {rank}: group handles {local} and {other} are both live as global handle {global}")]
    HandleAlias {
        rank: Rank,
        global: Handle,
        local: Handle,
        other: Handle,
    },
}

/// Fatal errors of the second (emission) pass
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("rank {rank}: {kind} handle {handle} unresolved at tick {at}")]
    UnresolvedHandle {
        rank: Rank,
        kind: HandleKind,
        handle: Handle,
        at: Tick,
    },

    #[error("rank {rank} corrupt: {source}")]
    Codec {
        rank: Rank,
        #[source]
        source: CodecError,
    },

    #[error("no resolved state for rank {0}")]
    UnknownRank(Rank),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Errors loading the run metadata file
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metadata: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("metadata lists {files} trace files for {numprocs} ranks")]
    RankCountMismatch { numprocs: usize, files: usize },
}
