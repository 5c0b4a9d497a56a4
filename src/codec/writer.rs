use super::record::{Call, CallRecord};
use super::{MAGIC, MASK_CPU, MASK_PERF, MASK_STATUS, MASK_THREAD, MASK_WALL, VERSION};
use crate::error::CodecError;
use crate::types::{Rank, TimeSpan};
use std::io::Write;

/// Encoder for one rank's trace stream
pub struct TraceWriter<W: Write> {
    out: W,
    buf: Vec<u8>,
    records: u64,
}

impl<W: Write> TraceWriter<W> {
    /// Write the stream header for `rank`
    pub fn new(mut out: W, rank: Rank) -> Result<Self, CodecError> {
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_be_bytes())?;
        out.write_all(&rank.to_be_bytes())?;
        Ok(Self {
            out,
            buf: Vec::with_capacity(128),
            records: 0,
        })
    }

    pub fn write(&mut self, record: &CallRecord) -> Result<(), CodecError> {
        self.buf.clear();
        encode_record(record, &mut self.buf)?;
        self.out.write_all(&self.buf)?;
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W, CodecError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_len(buf: &mut Vec<u8>, what: &'static str, len: usize) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| CodecError::TooLong { what, len })?;
    put_u32(buf, len);
    Ok(())
}

fn put_i32s(buf: &mut Vec<u8>, values: &[i32]) -> Result<(), CodecError> {
    put_len(buf, "array", values.len())?;
    values.iter().for_each(|&v| put_i32(buf, v));
    Ok(())
}

fn put_i64s(buf: &mut Vec<u8>, values: &[i64]) -> Result<(), CodecError> {
    put_len(buf, "array", values.len())?;
    values.iter().for_each(|&v| put_i64(buf, v));
    Ok(())
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len()).map_err(|_| CodecError::TooLong {
        what: "string",
        len: s.len(),
    })?;
    put_u16(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_span(buf: &mut Vec<u8>, span: &TimeSpan) {
    put_u32(buf, span.start.sec);
    put_u32(buf, span.start.nsec);
    put_u32(buf, span.stop.sec);
    put_u32(buf, span.stop.nsec);
}

fn encode_record(record: &CallRecord, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut mask = 0u8;
    if record.wall.is_some() {
        mask |= MASK_WALL;
    }
    if record.cpu.is_some() {
        mask |= MASK_CPU;
    }
    if record.thread.is_some() {
        mask |= MASK_THREAD;
    }
    if !record.perf.is_empty() {
        mask |= MASK_PERF;
    }
    if record.status.is_some() {
        mask |= MASK_STATUS;
    }

    put_u16(buf, record.call.tag());
    buf.push(mask);

    if let Some(wall) = &record.wall {
        put_span(buf, wall);
    }
    if let Some(cpu) = &record.cpu {
        put_span(buf, cpu);
    }
    if let Some(thread) = record.thread {
        put_u16(buf, thread);
    }
    if !record.perf.is_empty() {
        let n = u8::try_from(record.perf.len()).map_err(|_| CodecError::TooLong {
            what: "perf counter list",
            len: record.perf.len(),
        })?;
        buf.push(n);
        for counter in &record.perf {
            put_string(buf, &counter.name)?;
            put_u64(buf, counter.start);
            put_u64(buf, counter.stop);
        }
    }

    if let Some(status) = &record.status {
        put_i32(buf, status.source);
        put_i32(buf, status.tag);
        put_i32(buf, status.count);
        buf.push(u8::from(status.cancelled));
        put_i32(buf, status.error);
    }

    encode_call(&record.call, buf)
}

fn encode_call(call: &Call, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    match call {
        Call::Init | Call::Finalize => {}
        Call::Send { dest, tag, count, datatype, comm } => {
            for v in [*dest, *tag, *count, *datatype, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Isend { dest, tag, count, datatype, comm, request } => {
            for v in [*dest, *tag, *count, *datatype, *comm, *request] {
                put_i32(buf, v);
            }
        }
        Call::Recv { source, tag, count, datatype, comm } => {
            for v in [*source, *tag, *count, *datatype, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Irecv { source, tag, count, datatype, comm, request } => {
            for v in [*source, *tag, *count, *datatype, *comm, *request] {
                put_i32(buf, v);
            }
        }
        Call::Wait { request } => put_i32(buf, *request),
        Call::Waitall { requests } => put_i32s(buf, requests)?,
        Call::Barrier { comm } => put_i32(buf, *comm),
        Call::Bcast { root, count, datatype, comm } => {
            for v in [*root, *count, *datatype, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Reduce { root, count, datatype, op, comm } => {
            for v in [*root, *count, *datatype, *op, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Allreduce { count, datatype, op, comm } => {
            for v in [*count, *datatype, *op, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Gather { root, sendcount, sendtype, recvcount, recvtype, comm } => {
            for v in [*root, *sendcount, *sendtype, *recvcount, *recvtype, *comm] {
                put_i32(buf, v);
            }
        }
        Call::Allgather { sendcount, sendtype, recvcount, recvtype, comm }
        | Call::Alltoall { sendcount, sendtype, recvcount, recvtype, comm } => {
            for v in [*sendcount, *sendtype, *recvcount, *recvtype, *comm] {
                put_i32(buf, v);
            }
        }
        Call::CommRank { comm, rank: value } | Call::CommSize { comm, size: value } => {
            put_i32(buf, *comm);
            put_i32(buf, *value);
        }
        Call::CommDup { comm, newcomm } => {
            put_i32(buf, *comm);
            put_i32(buf, *newcomm);
        }
        Call::CommCreate { comm, group, newcomm } => {
            for v in [*comm, *group, *newcomm] {
                put_i32(buf, v);
            }
        }
        Call::CommSplit { comm, color, key, newcomm } => {
            for v in [*comm, *color, *key, *newcomm] {
                put_i32(buf, v);
            }
        }
        Call::CommFree { comm } => put_i32(buf, *comm),
        Call::CommGroup { comm, group } => {
            put_i32(buf, *comm);
            put_i32(buf, *group);
        }
        Call::CommSetName { comm, name } => {
            put_i32(buf, *comm);
            put_string(buf, name)?;
        }
        Call::GroupSize { group, size: value } | Call::GroupRank { group, rank: value } => {
            put_i32(buf, *group);
            put_i32(buf, *value);
        }
        Call::GroupUnion { group1, group2, newgroup }
        | Call::GroupIntersection { group1, group2, newgroup }
        | Call::GroupDifference { group1, group2, newgroup } => {
            for v in [*group1, *group2, *newgroup] {
                put_i32(buf, v);
            }
        }
        Call::GroupIncl { group, ranks, newgroup } | Call::GroupExcl { group, ranks, newgroup } => {
            put_i32(buf, *group);
            put_i32s(buf, ranks)?;
            put_i32(buf, *newgroup);
        }
        Call::GroupRangeIncl { group, ranges, newgroup }
        | Call::GroupRangeExcl { group, ranges, newgroup } => {
            put_i32(buf, *group);
            put_len(buf, "range list", ranges.len())?;
            for range in ranges {
                range.iter().for_each(|&v| put_i32(buf, v));
            }
            put_i32(buf, *newgroup);
        }
        Call::GroupFree { group } => put_i32(buf, *group),
        Call::TypeContiguous { count, oldtype, newtype } => {
            for v in [*count, *oldtype, *newtype] {
                put_i32(buf, v);
            }
        }
        Call::TypeVector { count, blocklength, stride, oldtype, newtype } => {
            for v in [*count, *blocklength, *stride, *oldtype, *newtype] {
                put_i32(buf, v);
            }
        }
        Call::TypeHvector { count, blocklength, stride, oldtype, newtype } => {
            put_i32(buf, *count);
            put_i32(buf, *blocklength);
            put_i64(buf, *stride);
            put_i32(buf, *oldtype);
            put_i32(buf, *newtype);
        }
        Call::TypeIndexed { blocklengths, displacements, oldtype, newtype } => {
            put_i32s(buf, blocklengths)?;
            put_i32s(buf, displacements)?;
            put_i32(buf, *oldtype);
            put_i32(buf, *newtype);
        }
        Call::TypeHindexed { blocklengths, displacements, oldtype, newtype } => {
            put_i32s(buf, blocklengths)?;
            put_i64s(buf, displacements)?;
            put_i32(buf, *oldtype);
            put_i32(buf, *newtype);
        }
        Call::TypeStruct { blocklengths, displacements, types, newtype } => {
            put_i32s(buf, blocklengths)?;
            put_i64s(buf, displacements)?;
            put_i32s(buf, types)?;
            put_i32(buf, *newtype);
        }
        Call::TypeDup { oldtype, newtype } => {
            put_i32(buf, *oldtype);
            put_i32(buf, *newtype);
        }
        Call::TypeCreateIndexedBlock { blocklength, displacements, oldtype, newtype } => {
            put_i32(buf, *blocklength);
            put_i32s(buf, displacements)?;
            put_i32(buf, *oldtype);
            put_i32(buf, *newtype);
        }
        Call::TypeCreateSubarray { sizes, subsizes, starts, order, oldtype, newtype } => {
            put_i32s(buf, sizes)?;
            put_i32s(buf, subsizes)?;
            put_i32s(buf, starts)?;
            for v in [*order, *oldtype, *newtype] {
                put_i32(buf, v);
            }
        }
        Call::TypeCreateResized { oldtype, lb, extent, newtype } => {
            put_i32(buf, *oldtype);
            put_i64(buf, *lb);
            put_i64(buf, *extent);
            put_i32(buf, *newtype);
        }
        Call::TypeCommit { datatype } | Call::TypeFree { datatype } => put_i32(buf, *datatype),
        Call::TypeSize { datatype, size } => {
            put_i32(buf, *datatype);
            put_i32(buf, *size);
        }
    }
    Ok(())
}
