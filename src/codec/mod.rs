//! Binary per-rank trace format.
//!
//! A trace file is an 8-byte magic, a `u16` format version and the `u32` rank
//! that wrote it, followed by framed call records. Every record starts with a
//! `u16` call tag and a presence mask saying which optional fields were
//! captured, followed by those fields and the call's own arguments. All
//! integers are big-endian.

mod reader;
mod record;
mod writer;

pub use reader::{RecordCodec, StreamPosition, TraceFile};
pub use record::{Call, CallRecord, CollectiveKind, PerfCounter, Status};
pub use writer::TraceWriter;

pub const MAGIC: &[u8; 8] = b"MPTRACE\0";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: u64 = 14;

pub const MASK_WALL: u8 = 0x01;
pub const MASK_CPU: u8 = 0x02;
pub const MASK_THREAD: u8 = 0x04;
pub const MASK_PERF: u8 = 0x08;
pub const MASK_STATUS: u8 = 0x10;
