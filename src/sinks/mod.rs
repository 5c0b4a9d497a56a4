//! Concrete [`crate::emitter::EventSink`] implementations

pub mod ascii;
pub mod rewrite;
pub mod stats;

pub use ascii::AsciiSink;
pub use rewrite::RewriteSink;
pub use stats::{StatsReport, StatsSink};
