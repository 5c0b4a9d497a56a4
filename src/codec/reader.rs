use super::record::{Call, CallRecord, PerfCounter, Status};
use super::{HEADER_LEN, MAGIC, MASK_CPU, MASK_PERF, MASK_STATUS, MASK_THREAD, MASK_WALL, VERSION};
use crate::error::CodecError;
use crate::types::{ClockTime, Rank, TimeSpan};
use std::fs;
use std::path::Path;

/// Byte offset of a record inside a trace stream
pub type StreamPosition = u64;

/// Random-access decoder for one rank's stream
pub trait RecordCodec {
    /// Rank recorded in the stream header
    fn rank(&self) -> Rank;

    /// Offset of the first record
    fn first_position(&self) -> StreamPosition;

    /// Total stream length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() <= self.first_position()
    }

    /// Decode the record starting at `pos`; `None` at end of stream
    fn read_next(&self, pos: StreamPosition) -> Result<Option<(CallRecord, StreamPosition)>, CodecError>;
}

impl<C: RecordCodec + ?Sized> RecordCodec for &C {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn first_position(&self) -> StreamPosition {
        (**self).first_position()
    }

    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_next(&self, pos: StreamPosition) -> Result<Option<(CallRecord, StreamPosition)>, CodecError> {
        (**self).read_next(pos)
    }
}

/// A whole trace file held in memory
#[derive(Debug, Clone)]
pub struct TraceFile {
    rank: Rank,
    bytes: Vec<u8>,
}

impl TraceFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Validate the header and wrap `bytes`
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(&bytes, 0);
        let magic = r.take(MAGIC.len())?;
        if magic != MAGIC {
            return Err(CodecError::BadMagic { offset: 0 });
        }
        let version = r.u16()?;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }
        let rank = r.u32()?;
        Ok(Self { rank, bytes })
    }
}

impl RecordCodec for TraceFile {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn first_position(&self) -> StreamPosition {
        HEADER_LEN
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_next(&self, pos: StreamPosition) -> Result<Option<(CallRecord, StreamPosition)>, CodecError> {
        if pos >= self.len() {
            return Ok(None);
        }
        let mut r = ByteReader::new(&self.bytes, pos as usize);
        let record = decode_record(&mut r)?;
        Ok(Some((record, r.pos as u64)))
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn offset(&self) -> u64 {
        self.pos as u64
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(CodecError::Truncated { offset: self.offset() })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn len_prefix(&mut self, elem_size: usize) -> Result<usize, CodecError> {
        let at = self.offset();
        let n = self.u32()? as usize;
        // Reject lengths that cannot fit before reading them element by element
        if n.saturating_mul(elem_size) > self.bytes.len().saturating_sub(self.pos) {
            return Err(CodecError::Truncated { offset: at });
        }
        Ok(n)
    }

    fn i32s(&mut self) -> Result<Vec<i32>, CodecError> {
        let n = self.len_prefix(4)?;
        (0..n).map(|_| self.i32()).collect()
    }

    fn i64s(&mut self) -> Result<Vec<i64>, CodecError> {
        let n = self.len_prefix(8)?;
        (0..n).map(|_| self.i64()).collect()
    }

    fn ranges(&mut self) -> Result<Vec<[i32; 3]>, CodecError> {
        let n = self.len_prefix(12)?;
        (0..n)
            .map(|_| -> Result<[i32; 3], CodecError> { Ok([self.i32()?, self.i32()?, self.i32()?]) })
            .collect()
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let at = self.offset();
        let n = self.u16()? as usize;
        let raw = self.take(n)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::BadString { offset: at })
    }

    fn clock(&mut self) -> Result<ClockTime, CodecError> {
        Ok(ClockTime::new(self.u32()?, self.u32()?))
    }

    fn span(&mut self) -> Result<TimeSpan, CodecError> {
        Ok(TimeSpan {
            start: self.clock()?,
            stop: self.clock()?,
        })
    }
}

fn decode_record(r: &mut ByteReader<'_>) -> Result<CallRecord, CodecError> {
    let start = r.offset();
    let tag = r.u16()?;
    let mask = r.u8()?;

    // Optional fields follow in mask bit order, ahead of the call arguments
    let wall = if mask & MASK_WALL != 0 { Some(r.span()?) } else { None };
    let cpu = if mask & MASK_CPU != 0 { Some(r.span()?) } else { None };
    let thread = if mask & MASK_THREAD != 0 { Some(r.u16()?) } else { None };
    let mut perf = Vec::new();
    if mask & MASK_PERF != 0 {
        let n = r.u8()?;
        for _ in 0..n {
            perf.push(PerfCounter {
                name: r.string()?,
                start: r.u64()?,
                stop: r.u64()?,
            });
        }
    }

    let status = if mask & MASK_STATUS != 0 {
        Some(Status {
            source: r.i32()?,
            tag: r.i32()?,
            count: r.i32()?,
            cancelled: r.u8()? != 0,
            error: r.i32()?,
        })
    } else {
        None
    };

    let call = decode_call(tag, start, r)?;

    Ok(CallRecord {
        call,
        thread,
        wall,
        cpu,
        perf,
        status,
    })
}

fn decode_call(tag: u16, offset: u64, r: &mut ByteReader<'_>) -> Result<Call, CodecError> {
    let call = match tag {
        0x0001 => Call::Init,
        0x0002 => Call::Finalize,
        0x0010 => Call::Send {
            dest: r.i32()?,
            tag: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            comm: r.i32()?,
        },
        0x0011 => Call::Isend {
            dest: r.i32()?,
            tag: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            comm: r.i32()?,
            request: r.i32()?,
        },
        0x0012 => Call::Recv {
            source: r.i32()?,
            tag: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            comm: r.i32()?,
        },
        0x0013 => Call::Irecv {
            source: r.i32()?,
            tag: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            comm: r.i32()?,
            request: r.i32()?,
        },
        0x0014 => Call::Wait { request: r.i32()? },
        0x0015 => Call::Waitall { requests: r.i32s()? },
        0x0020 => Call::Barrier { comm: r.i32()? },
        0x0021 => Call::Bcast {
            root: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            comm: r.i32()?,
        },
        0x0022 => Call::Reduce {
            root: r.i32()?,
            count: r.i32()?,
            datatype: r.i32()?,
            op: r.i32()?,
            comm: r.i32()?,
        },
        0x0023 => Call::Allreduce {
            count: r.i32()?,
            datatype: r.i32()?,
            op: r.i32()?,
            comm: r.i32()?,
        },
        0x0024 => Call::Gather {
            root: r.i32()?,
            sendcount: r.i32()?,
            sendtype: r.i32()?,
            recvcount: r.i32()?,
            recvtype: r.i32()?,
            comm: r.i32()?,
        },
        0x0025 => Call::Allgather {
            sendcount: r.i32()?,
            sendtype: r.i32()?,
            recvcount: r.i32()?,
            recvtype: r.i32()?,
            comm: r.i32()?,
        },
        0x0026 => Call::Alltoall {
            sendcount: r.i32()?,
            sendtype: r.i32()?,
            recvcount: r.i32()?,
            recvtype: r.i32()?,
            comm: r.i32()?,
        },
        0x0030 => Call::CommRank { comm: r.i32()?, rank: r.i32()? },
        0x0031 => Call::CommSize { comm: r.i32()?, size: r.i32()? },
        0x0032 => Call::CommDup { comm: r.i32()?, newcomm: r.i32()? },
        0x0033 => Call::CommCreate {
            comm: r.i32()?,
            group: r.i32()?,
            newcomm: r.i32()?,
        },
        0x0034 => Call::CommSplit {
            comm: r.i32()?,
            color: r.i32()?,
            key: r.i32()?,
            newcomm: r.i32()?,
        },
        0x0035 => Call::CommFree { comm: r.i32()? },
        0x0036 => Call::CommGroup { comm: r.i32()?, group: r.i32()? },
        0x0037 => Call::CommSetName { comm: r.i32()?, name: r.string()? },
        0x0040 => Call::GroupSize { group: r.i32()?, size: r.i32()? },
        0x0041 => Call::GroupRank { group: r.i32()?, rank: r.i32()? },
        0x0042 => Call::GroupUnion {
            group1: r.i32()?,
            group2: r.i32()?,
            newgroup: r.i32()?,
        },
        0x0043 => Call::GroupIntersection {
            group1: r.i32()?,
            group2: r.i32()?,
            newgroup: r.i32()?,
        },
        0x0044 => Call::GroupDifference {
            group1: r.i32()?,
            group2: r.i32()?,
            newgroup: r.i32()?,
        },
        0x0045 => Call::GroupIncl {
            group: r.i32()?,
            ranks: r.i32s()?,
            newgroup: r.i32()?,
        },
        0x0046 => Call::GroupExcl {
            group: r.i32()?,
            ranks: r.i32s()?,
            newgroup: r.i32()?,
        },
        0x0047 => Call::GroupRangeIncl {
            group: r.i32()?,
            ranges: r.ranges()?,
            newgroup: r.i32()?,
        },
        0x0048 => Call::GroupRangeExcl {
            group: r.i32()?,
            ranges: r.ranges()?,
            newgroup: r.i32()?,
        },
        0x0049 => Call::GroupFree { group: r.i32()? },
        0x0050 => Call::TypeContiguous {
            count: r.i32()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0051 => Call::TypeVector {
            count: r.i32()?,
            blocklength: r.i32()?,
            stride: r.i32()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0052 => Call::TypeHvector {
            count: r.i32()?,
            blocklength: r.i32()?,
            stride: r.i64()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0053 => Call::TypeIndexed {
            blocklengths: r.i32s()?,
            displacements: r.i32s()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0054 => Call::TypeHindexed {
            blocklengths: r.i32s()?,
            displacements: r.i64s()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0055 => Call::TypeStruct {
            blocklengths: r.i32s()?,
            displacements: r.i64s()?,
            types: r.i32s()?,
            newtype: r.i32()?,
        },
        0x0056 => Call::TypeDup {
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0057 => Call::TypeCreateIndexedBlock {
            blocklength: r.i32()?,
            displacements: r.i32s()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0058 => Call::TypeCreateSubarray {
            sizes: r.i32s()?,
            subsizes: r.i32s()?,
            starts: r.i32s()?,
            order: r.i32()?,
            oldtype: r.i32()?,
            newtype: r.i32()?,
        },
        0x0059 => Call::TypeCreateResized {
            oldtype: r.i32()?,
            lb: r.i64()?,
            extent: r.i64()?,
            newtype: r.i32()?,
        },
        0x005a => Call::TypeCommit { datatype: r.i32()? },
        0x005b => Call::TypeFree { datatype: r.i32()? },
        0x005c => Call::TypeSize {
            datatype: r.i32()?,
            size: r.i32()?,
        },
        _ => return Err(CodecError::UnknownTag { tag, offset }),
    };
    Ok(call)
}
