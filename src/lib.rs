//! Offline replay of per-rank MPI call traces.
//!
//! Every rank's trace only knows its own small integer handles. The first
//! pass ([`scheduler::resolve`]) replays all ranks together, matching the
//! collective calls that create communicators so each one gets a run-wide id.
//! The second pass ([`emitter::EventEmitter`]) replays each rank again and
//! hands every call, with its handles resolved, to an [`emitter::EventSink`].

pub mod actor;
pub mod cli;
pub mod codec;
pub mod csv_writer;
pub mod emitter;
pub mod error;
pub mod group;
pub mod meta;
pub mod registry;
pub mod reporter;
pub mod resolver;
pub mod scheduler;
pub mod sinks;
pub mod types;
