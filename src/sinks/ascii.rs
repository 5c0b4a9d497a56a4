//! Human-readable call dump.

use crate::emitter::{EventSink, ResolvedCall};
use crate::error::SinkError;
use crate::types::{ClockTime, Rank};
use termcolor::{Color, ColorSpec, WriteColor};

/// Writes every call as a header line, its arguments and one line per resolved handle
pub struct AsciiSink<W> {
    out: W,
    /// Only dump calls whose MPI name contains this string
    filter: Option<String>,
    written: u64,
}

impl<W: WriteColor> AsciiSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            filter: None,
            written: 0,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn header(&mut self, rank: Rank, call: &ResolvedCall<'_>, verb: &str, at: Option<ClockTime>) -> Result<(), SinkError> {
        self.out
            .set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        write!(self.out, "[{rank}:{}] {} {verb}", call.tick, call.record.call.name())?;
        self.out.reset()?;
        match at {
            Some(t) => writeln!(self.out, " at walltime {t}")?,
            None => writeln!(self.out)?,
        }
        Ok(())
    }
}

impl<W: WriteColor> EventSink for AsciiSink<W> {
    fn emit(
        &mut self,
        rank: Rank,
        start: Option<ClockTime>,
        stop: Option<ClockTime>,
        call: &ResolvedCall<'_>,
    ) -> Result<(), SinkError> {
        let record = call.record;
        if let Some(filter) = &self.filter {
            if !record.call.name().contains(filter.as_str()) {
                return Ok(());
            }
        }

        self.header(rank, call, "entering", start)?;
        writeln!(self.out, "  {}", record.call)?;

        for handle in &call.handles {
            self.out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            write!(self.out, "  {} {}", handle.kind, handle.local)?;
            self.out.reset()?;
            writeln!(self.out, " -> {}", handle.target)?;
        }

        if let Some(thread) = record.thread {
            writeln!(self.out, "  thread {thread}")?;
        }
        if let Some(cpu) = record.cpu {
            writeln!(self.out, "  cputime {} .. {}", cpu.start, cpu.stop)?;
        }
        for counter in &record.perf {
            writeln!(
                self.out,
                "  perf {} = {}",
                counter.name,
                counter.stop.saturating_sub(counter.start)
            )?;
        }
        if let Some(status) = record.status {
            writeln!(
                self.out,
                "  status source={} tag={} count={} cancelled={} error={}",
                status.source, status.tag, status.count, status.cancelled, status.error
            )?;
        }

        self.header(rank, call, "returning", stop)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}
