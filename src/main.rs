use anyhow::{Context, anyhow};
use clap::Parser;
use mpitrace::actor::Truncation;
use mpitrace::cli::{Cli, Commands, TraceArgs};
use mpitrace::codec::TraceFile;
use mpitrace::csv_writer;
use mpitrace::emitter::EventEmitter;
use mpitrace::meta::TraceMeta;
use mpitrace::reporter;
use mpitrace::scheduler::{self, ConvertOptions, ResolvedRun};
use mpitrace::sinks::{AsciiSink, RewriteSink, StatsSink};
use std::process;
use termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> anyhow::Result<()> {
    let options = convert_options(&command);
    let (meta, traces, run) = first_pass(command.trace(), &options)?;

    match command {
        Commands::Dump { filter, no_color, .. } => {
            let choice = if no_color { ColorChoice::Never } else { ColorChoice::Auto };
            let mut sink = AsciiSink::new(StandardStream::stdout(choice));
            if let Some(filter) = filter {
                sink = sink.with_filter(filter);
            }
            EventEmitter::new(&run).emit_all(&traces, &mut sink)?;
        }
        Commands::Stats { json, quiet, csv, .. } => {
            let mut sink = StatsSink::new(&options.bins).context("Invalid --bin pattern")?;
            EventEmitter::new(&run).emit_all(&traces, &mut sink)?;
            let report = sink.report();

            if json {
                reporter::print_json(&report)?;
            } else if !quiet {
                reporter::print_stats(&report)?;
            }

            if let Some(path) = csv {
                csv_writer::export_stats_csv(&report, &path)?;
                if !quiet && !json {
                    eprintln!("Statistics CSV exported to: {}", path);
                }
            }
        }
        Commands::Ids { json, csv, .. } => {
            if json {
                reporter::print_json(&run.ids)?;
            } else {
                reporter::print_summary(&run)?;
                reporter::print_ids(&run.ids)?;
            }

            if let Some(path) = csv {
                csv_writer::export_ids_csv(&run.ids, &path)?;
                if !json {
                    eprintln!("Communicator CSV exported to: {}", path);
                }
            }
        }
        Commands::Rewrite { out_dir, prefix, .. } => {
            let mut sink = RewriteSink::create(&out_dir, &prefix, &meta)
                .with_context(|| format!("Failed to create output traces in {}", out_dir.display()))?;
            let summary = EventEmitter::new(&run).emit_all(&traces, &mut sink)?;
            eprintln!(
                "Rewrote {} calls from {} ranks; metadata: {}",
                summary.calls,
                summary.ranks,
                sink.meta_path().display()
            );
        }
    }

    Ok(())
}

fn convert_options(command: &Commands) -> ConvertOptions {
    let trace = command.trace();
    let truncation = match (trace.stop_offset, trace.stop_percent) {
        (Some(offset), _) => Some(Truncation::Offset(offset)),
        (None, Some(percent)) => Some(Truncation::Percent(percent)),
        (None, None) => None,
    };
    let bins = match command {
        Commands::Stats { bins, .. } => bins.clone(),
        _ => Vec::new(),
    };
    ConvertOptions { truncation, bins }
}

/// Load the run, open every trace and resolve global ids
fn first_pass(
    args: &TraceArgs,
    options: &ConvertOptions,
) -> anyhow::Result<(TraceMeta, Vec<TraceFile>, ResolvedRun)> {
    let meta = TraceMeta::load(&args.meta)
        .with_context(|| format!("Failed to load metadata: {}", args.meta.display()))?;
    let traces = meta
        .open_traces()
        .map_err(|(rank, e)| anyhow!("rank {}: {}: {}", rank, meta.files[rank].display(), e))?;

    let run = scheduler::resolve(traces.iter().collect::<Vec<_>>(), options)?;
    Ok((meta, traces, run))
}
