//! Re-encode every rank's trace with globally consistent handles.
//!
//! The rewritten traces keep the predefined handle conventions, so they can be
//! resolved again: the world and self communicators stay `COMM_WORLD` and
//! `COMM_SELF`, the empty group stays `GROUP_EMPTY` and 0 stays null. Every
//! other communicator and group is numbered after the predefined range by its
//! global id. Datatype handles are rank-local by nature and are left alone.

use crate::codec::{Call, TraceWriter};
use crate::emitter::{EventSink, ResolvedCall, Target};
use crate::error::SinkError;
use crate::meta::TraceMeta;
use crate::types::{COMM_SELF, COMM_WORLD, ClockTime, GROUP_EMPTY, Handle, HandleKind, Rank};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Global handle written for a resolved target in a run of `nranks`
pub fn global_handle(target: &Target, nranks: u32) -> Option<Handle> {
    match *target {
        Target::Null => Some(0),
        Target::Comm { id, .. } if id.0 == 0 => Some(COMM_WORLD),
        Target::Comm { id, .. } if id.0 <= nranks => Some(COMM_SELF),
        Target::Comm { id, .. } => offset_handle(id.0 - nranks, COMM_SELF),
        Target::Group { id, .. } if id.0 == 1 + nranks => Some(GROUP_EMPTY),
        Target::Group { id, .. } if id.0 <= nranks => offset_handle(id.0, GROUP_EMPTY + 1),
        Target::Group { id, .. } => offset_handle(id.0, GROUP_EMPTY),
        Target::Datatype { .. } => None,
    }
}

fn offset_handle(id: u32, base: Handle) -> Option<Handle> {
    Handle::try_from(id).ok()?.checked_add(base)
}

pub struct RewriteSink {
    out_dir: PathBuf,
    prefix: String,
    writers: Vec<TraceWriter<BufWriter<File>>>,
    files: Vec<PathBuf>,
    template: TraceMeta,
    /// Per rank, the local handle currently holding each global group handle
    live_groups: Vec<HashMap<Handle, Handle>>,
}

impl RewriteSink {
    /// Create one output file per rank in `out_dir`
    pub fn create(out_dir: impl AsRef<Path>, prefix: &str, source: &TraceMeta) -> Result<Self, SinkError> {
        let out_dir = out_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_dir)?;

        let mut writers = Vec::with_capacity(source.numprocs);
        let mut files = Vec::with_capacity(source.numprocs);
        for rank in 0..source.numprocs {
            let name = PathBuf::from(format!("{prefix}-{rank:04}.bin"));
            let file = File::create(out_dir.join(&name))?;
            writers.push(TraceWriter::new(BufWriter::new(file), rank as Rank)?);
            files.push(name);
        }

        Ok(Self {
            out_dir,
            prefix: prefix.to_string(),
            writers,
            live_groups: vec![HashMap::new(); source.numprocs],
            files,
            template: source.clone(),
        })
    }

    pub fn meta_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.meta.json", self.prefix))
    }
}

impl EventSink for RewriteSink {
    fn emit(
        &mut self,
        rank: Rank,
        _start: Option<ClockTime>,
        _stop: Option<ClockTime>,
        call: &ResolvedCall<'_>,
    ) -> Result<(), SinkError> {
        let index = rank as usize;
        let (Some(writer), Some(live)) = (self.writers.get_mut(index), self.live_groups.get_mut(index)) else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("no output stream for rank {rank}")).into());
        };
        let nranks = self.files.len() as u32;

        let mut record = call.record.clone();
        let freed = match record.call {
            Call::GroupFree { group } => Some(group),
            _ => None,
        };
        for ((kind, handle), resolved) in record.call.handles_mut().into_iter().zip(&call.handles) {
            if kind == HandleKind::Datatype {
                continue;
            }
            let Some(global) = global_handle(&resolved.target, nranks) else {
                continue;
            };
            if kind == HandleKind::Group && global != GROUP_EMPTY {
                let holder = *live.entry(global).or_insert(resolved.local);
                if holder != resolved.local {
                    return Err(SinkError::HandleAlias {
                        rank,
                        global,
                        local: resolved.local,
                        other: holder,
                    });
                }
                if freed == Some(resolved.local) {
                    live.remove(&global);
                }
            }
            *handle = global;
        }
        writer.write(&record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        let meta = TraceMeta {
            numprocs: self.files.len(),
            hostname: self.template.hostname.clone(),
            start_time: self.template.start_time,
            files: self.files.clone(),
        };
        let path = self.meta_path();
        let json = serde_json::to_string_pretty(&meta)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), ranks = meta.numprocs, "rewrote traces");
        Ok(())
    }
}
