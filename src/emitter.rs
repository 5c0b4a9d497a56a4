//! Second pass: replay each rank with every handle resolved to its global identity.

use crate::codec::{CallRecord, RecordCodec};
use crate::error::{EmitError, SinkError};
use crate::scheduler::ResolvedRun;
use crate::types::{
    COMM_NULL, ClockTime, CommId, DATATYPE_NULL, GROUP_NULL, GroupId, Handle, HandleKind, Rank,
    Tick,
};
use serde::Serialize;
use std::fmt;

/// What a handle argument referred to when the call was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum Target {
    Null,
    Comm {
        id: CommId,
        local_rank: usize,
        size: usize,
    },
    Group {
        id: GroupId,
        size: usize,
    },
    Datatype {
        size: u64,
        committed: bool,
    },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Null => f.write_str("null"),
            Target::Comm { id, local_rank, size } => {
                write!(f, "{id} (rank {local_rank} of {size})")
            }
            Target::Group { id, size } => write!(f, "{id} (size {size})"),
            Target::Datatype { size, committed } => {
                write!(f, "{size} bytes")?;
                if !committed {
                    f.write_str(", uncommitted")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedHandle {
    pub kind: HandleKind,
    pub local: Handle,
    #[serde(flatten)]
    pub target: Target,
}

/// One call with all of its handle arguments resolved
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCall<'a> {
    pub tick: Tick,
    pub record: &'a CallRecord,
    /// In the order of [`crate::codec::Call::handles`]
    pub handles: Vec<ResolvedHandle>,
}

impl ResolvedCall<'_> {
    /// Global communicator the call ran on, if it takes one
    pub fn communicator(&self) -> Option<CommId> {
        self.handles.iter().find_map(|h| match h.target {
            Target::Comm { id, .. } if h.kind == HandleKind::Comm => Some(id),
            _ => None,
        })
    }

    /// Bytes moved by this rank: count times the resolved datatype size, `None` on overflow
    pub fn payload_bytes(&self) -> Option<u64> {
        let (count, datatype) = self.record.call.payload()?;
        let count = u64::try_from(count).ok()?;
        self.handles.iter().find_map(|h| match h.target {
            Target::Datatype { size, .. } if h.local == datatype => count.checked_mul(size),
            _ => None,
        })
    }
}

/// Receives the second pass output, one call at a time
pub trait EventSink {
    fn emit(
        &mut self,
        rank: Rank,
        start: Option<ClockTime>,
        stop: Option<ClockTime>,
        call: &ResolvedCall<'_>,
    ) -> Result<(), SinkError>;

    /// Called once after every rank has been replayed
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Totals of one emission run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmitSummary {
    pub ranks: usize,
    pub calls: u64,
}

pub struct EventEmitter<'a> {
    run: &'a ResolvedRun,
}

impl<'a> EventEmitter<'a> {
    pub fn new(run: &'a ResolvedRun) -> Self {
        Self { run }
    }

    fn resolve_handle(&self, rank: Rank, tick: Tick, kind: HandleKind, handle: Handle) -> Result<ResolvedHandle, EmitError> {
        let tables = self.run.rank(rank).ok_or(EmitError::UnknownRank(rank))?;
        let unresolved = |_| EmitError::UnresolvedHandle {
            rank,
            kind,
            handle,
            at: tick,
        };

        let target = match kind {
            HandleKind::Comm if handle == COMM_NULL => Target::Null,
            HandleKind::Group if handle == GROUP_NULL => Target::Null,
            HandleKind::Datatype if handle == DATATYPE_NULL => Target::Null,
            HandleKind::Comm => {
                let comm = tables.comms.get_at(handle, tick).map_err(unresolved)?;
                Target::Comm {
                    id: comm.global_id,
                    local_rank: comm.local_rank,
                    size: comm.size(),
                }
            }
            HandleKind::Group => {
                let group = tables.groups.get_at(handle, tick).map_err(unresolved)?;
                Target::Group {
                    id: group.global_id,
                    size: group.size(),
                }
            }
            HandleKind::Datatype => {
                let datatype = tables.types.get_at(handle, tick).map_err(unresolved)?;
                Target::Datatype {
                    size: datatype.size,
                    committed: datatype.usable_at(tick),
                }
            }
        };

        Ok(ResolvedHandle {
            kind,
            local: handle,
            target,
        })
    }

    /// Resolve every handle of `record` as of `tick`
    pub fn resolve<'r>(&self, rank: Rank, tick: Tick, record: &'r CallRecord) -> Result<ResolvedCall<'r>, EmitError> {
        let handles = record
            .call
            .handles()
            .into_iter()
            .map(|(kind, handle)| self.resolve_handle(rank, tick, kind, handle))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((_, datatype)) = record.call.payload() {
            let uncommitted = handles.iter().any(|h| {
                h.local == datatype && matches!(h.target, Target::Datatype { committed: false, .. })
            });
            if uncommitted {
                tracing::warn!(rank, %tick, datatype, call = record.call.name(), "communication with uncommitted datatype");
            }
        }

        Ok(ResolvedCall {
            tick,
            record,
            handles,
        })
    }

    /// Resolve one call and hand it to `sink`
    pub fn emit<S: EventSink + ?Sized>(&self, rank: Rank, tick: Tick, record: &CallRecord, sink: &mut S) -> Result<(), EmitError> {
        let call = self.resolve(rank, tick, record)?;
        let (start, stop) = match record.wall {
            Some(span) => (Some(span.start), Some(span.stop)),
            None => (None, None),
        };
        sink.emit(rank, start, stop, &call)?;
        Ok(())
    }

    /// Replay one rank up to the point where its first pass stopped
    pub fn replay_rank<C: RecordCodec, S: EventSink + ?Sized>(&self, codec: C, sink: &mut S) -> Result<u64, EmitError> {
        let rank = codec.rank();
        let tables = self.run.rank(rank).ok_or(EmitError::UnknownRank(rank))?;

        let mut position = codec.first_position();
        let mut tick = Tick::ORIGIN;
        while position < tables.stop_at && tick.0 < tables.records {
            let Some((record, next)) = codec
                .read_next(position)
                .map_err(|source| EmitError::Codec { rank, source })?
            else {
                break;
            };
            tick = tick.next();
            self.emit(rank, tick, &record, sink)?;
            position = next;
        }

        tracing::debug!(rank, calls = tick.0, "rank emitted");
        Ok(tick.0)
    }

    /// Replay every rank in rank order, then finish the sink
    pub fn emit_all<C: RecordCodec, S: EventSink + ?Sized>(
        &self,
        codecs: impl IntoIterator<Item = C>,
        sink: &mut S,
    ) -> Result<EmitSummary, EmitError> {
        let mut summary = EmitSummary::default();
        for codec in codecs {
            summary.calls += self.replay_rank(codec, sink)?;
            summary.ranks += 1;
        }
        sink.finish()?;
        tracing::info!(ranks = summary.ranks, calls = summary.calls, "second pass complete");
        Ok(summary)
    }
}
