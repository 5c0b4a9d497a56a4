use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mpitrace")]
#[command(about = "Replay per-rank MPI call traces with globally resolved communicators", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Input selection shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Run metadata file listing one trace per rank
    pub meta: PathBuf,

    /// Stop every rank at this byte offset
    #[arg(long, value_name = "BYTES", conflicts_with = "stop_percent")]
    pub stop_offset: Option<u64>,

    /// Stop every rank after this percentage of its trace
    #[arg(long, value_name = "PERCENT", value_parser = parse_percent)]
    pub stop_percent: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every call with its handles resolved
    Dump {
        #[command(flatten)]
        trace: TraceArgs,

        /// Only print calls whose MPI name contains this string
        #[arg(long)]
        filter: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Aggregate call counts, time and payload bytes
    Stats {
        #[command(flatten)]
        trace: TraceArgs,

        /// Bin definition NAME=REGEX, matched against MPI function names (repeatable)
        #[arg(long = "bin", value_name = "NAME=REGEX", value_parser = parse_bin)]
        bins: Vec<(String, String)>,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Suppress human-readable output (useful with --json or --csv)
        #[arg(long)]
        quiet: bool,

        /// Export per-bin statistics to CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<String>,
    },

    /// Show the global communicator and group tables
    Ids {
        #[command(flatten)]
        trace: TraceArgs,

        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,

        /// Export the communicator table to CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<String>,
    },

    /// Re-encode the traces with global communicator and group handles
    Rewrite {
        #[command(flatten)]
        trace: TraceArgs,

        /// Directory for the rewritten traces and metadata
        #[arg(short, long, value_name = "DIR")]
        out_dir: PathBuf,

        /// File name prefix of the rewritten traces
        #[arg(long, default_value = "global")]
        prefix: String,
    },
}

impl Commands {
    pub fn trace(&self) -> &TraceArgs {
        match self {
            Commands::Dump { trace, .. }
            | Commands::Stats { trace, .. }
            | Commands::Ids { trace, .. }
            | Commands::Rewrite { trace, .. } => trace,
        }
    }
}

/// Parse a `NAME=REGEX` bin definition
pub fn parse_bin(def: &str) -> Result<(String, String), String> {
    match def.split_once('=') {
        Some((name, pattern)) if !name.is_empty() && !pattern.is_empty() => {
            Ok((name.to_string(), pattern.to_string()))
        }
        _ => Err(format!("expected NAME=REGEX, got '{def}'")),
    }
}

fn parse_percent(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value > 0.0 && value <= 100.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not in (0, 100]"))
    }
}
