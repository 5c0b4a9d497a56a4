use crate::scheduler::IdTable;
use crate::sinks::StatsReport;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;

/// Export per-bin statistics to CSV
pub fn export_stats_csv(report: &StatsReport, path: &str) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create CSV file: {}", path))?;
    write_stats(&mut file, report)?;
    Ok(())
}

/// Export the resolved communicator table to CSV
pub fn export_ids_csv(ids: &IdTable, path: &str) -> Result<()> {
    let mut file = File::create(path)
        .context(format!("Failed to create id CSV file: {}", path))?;
    write_ids(&mut file, ids)?;
    Ok(())
}

fn write_stats(out: &mut impl Write, report: &StatsReport) -> Result<()> {
    writeln!(out, "bin,calls,wall_seconds,bytes")?;
    for row in &report.bins {
        writeln!(
            out,
            "\"{}\",{},{:.9},{}",
            escape_csv(&row.name),
            row.stats.calls,
            row.stats.wall_seconds,
            row.stats.bytes
        )?;
    }
    Ok(())
}

fn write_ids(out: &mut impl Write, ids: &IdTable) -> Result<()> {
    writeln!(out, "id,kind,parent,group,size,color,members")?;
    for comm in &ids.communicators {
        let members = comm
            .members
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            out,
            "{},{},{},{},{},{},\"{}\"",
            comm.id.0,
            comm.kind,
            comm.parent.map(|p| p.0.to_string()).unwrap_or_default(),
            comm.group.0,
            comm.size,
            comm.color.map(|c| c.to_string()).unwrap_or_default(),
            members
        )?;
    }
    Ok(())
}

/// Escape CSV field values
fn escape_csv(s: &str) -> String {
    // Replace quotes with double quotes
    s.replace('"', "\"\"")
}
