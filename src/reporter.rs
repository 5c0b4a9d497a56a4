use crate::scheduler::{IdTable, ResolvedRun};
use crate::sinks::StatsReport;
use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};

/// Format a byte count as B, KiB, MiB or GiB
fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;

    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds to HH:MM:SS.mmm
fn format_duration(seconds: f64) -> String {
    let millis = (seconds * 1000.0).round() as u64;
    let total_secs = millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis % 1000)
}

fn format_members(members: &[u32]) -> String {
    const SHOWN: usize = 16;
    let mut out = members
        .iter()
        .take(SHOWN)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    if members.len() > SHOWN {
        out.push_str(&format!(",... ({} more)", members.len() - SHOWN));
    }
    out
}

/// Write the per-rank first pass summary
pub fn write_summary(out: &mut impl Write, run: &ResolvedRun) -> io::Result<()> {
    writeln!(out, "\nRanks:           {}", run.nranks())?;
    writeln!(out, "Communicators:   {}", run.ids.communicators.len())?;
    writeln!(out, "Groups:          {}", run.ids.groups.len())?;
    writeln!(out)?;

    writeln!(out, "Per-rank replay:")?;
    for tables in &run.ranks {
        let span = tables
            .wall_bounds
            .map(|b| format_duration(b.seconds()))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "  rank {:5}  {:>8} calls  {:>12}  comms {:3}  groups {:3}  types {:3}",
            tables.rank,
            tables.records,
            span,
            tables.comms.len(),
            tables.groups.len(),
            tables.types.len()
        )?;
    }
    writeln!(out)
}

/// Write the global communicator and group tables
pub fn write_ids(out: &mut impl Write, ids: &IdTable) -> io::Result<()> {
    writeln!(out, "Communicators:")?;
    for comm in &ids.communicators {
        let parent = comm
            .parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let color = comm
            .color
            .map(|c| format!("  color {c}"))
            .unwrap_or_default();
        writeln!(
            out,
            "  {:<10} {:<7} parent {:<10} {:<10} size {:4}{}",
            comm.id.to_string(),
            comm.kind.to_string(),
            parent,
            comm.group.to_string(),
            comm.size,
            color
        )?;
    }

    writeln!(out, "\nGroups:")?;
    for group in &ids.groups {
        writeln!(
            out,
            "  {:<10} size {:4}  [{}]",
            group.id.to_string(),
            group.size,
            format_members(&group.members)
        )?;
    }
    writeln!(out)
}

/// Write aggregated statistics
pub fn write_stats(out: &mut impl Write, report: &StatsReport) -> io::Result<()> {
    writeln!(out, "\nCalls:           {}", report.total_calls)?;
    writeln!(out, "Payload:         {}", format_bytes(report.total_bytes))?;
    writeln!(out)?;

    writeln!(out, "Per-bin totals:")?;
    for row in &report.bins {
        writeln!(
            out,
            "  {:<28} {:>10}  {:>14}  {:>10}",
            row.name,
            row.stats.calls,
            format_duration(row.stats.wall_seconds),
            format_bytes(row.stats.bytes)
        )?;
    }

    if !report.communicators.is_empty() {
        writeln!(out, "\nCalls per communicator:")?;
        for row in &report.communicators {
            writeln!(out, "  {:<10} {:>10}", row.id.to_string(), row.calls)?;
        }
    }
    writeln!(out)
}

pub fn print_summary(run: &ResolvedRun) -> Result<()> {
    write_summary(&mut io::stdout().lock(), run)?;
    Ok(())
}

pub fn print_ids(ids: &IdTable) -> Result<()> {
    write_ids(&mut io::stdout().lock(), ids)?;
    Ok(())
}

pub fn print_stats(report: &StatsReport) -> Result<()> {
    write_stats(&mut io::stdout().lock(), report)?;
    Ok(())
}

/// Print JSON output, colored when stdout is a terminal
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = colored_json::to_colored_json_auto(&serde_json::to_value(value)?)?;
    println!("{}", json);
    Ok(())
}
