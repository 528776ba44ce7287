// CycleSnap CLI - Inspect, solve and regenerate MIDI loops from the command line

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use cyclesnap_lib::commands::{
    self, CommandResult, GenerateInput, GenerateOutput, SolveInput, SolveOutput,
};
use cyclesnap_lib::grid::GridSummary;

#[derive(Parser)]
#[command(name = "cyclesnap", version, about = "Geometric time-warp for looping MIDI patterns")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tracks, time base, tempo and segmentation of a MIDI file
    Inspect {
        input: PathBuf,
    },
    /// Solve the warp parameters for a MIDI file
    Solve {
        input: PathBuf,

        #[command(flatten)]
        solve: SolveArgs,
    },
    /// Solve, regenerate and write a warped MIDI file
    Generate {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        solve: SolveArgs,

        /// Write a debug dump next to the output (.txt)
        #[arg(long)]
        dump: bool,

        /// Append pipeline stages to a JSONL trace file
        #[arg(long)]
        trace: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SolveArgs {
    /// target-total-scale, fixed-beat-ratio, match-beat-end, fit-to-curve or fit-end-and-ratio
    #[arg(short, long)]
    mode: String,

    /// Loops of the source pattern
    #[arg(short, long)]
    loops: Option<f64>,

    /// Multiplier applied per loop
    #[arg(long)]
    multiplier: Option<f64>,

    /// Output duration / source duration
    #[arg(short, long)]
    ratio: Option<f64>,

    /// Scale of the last step relative to the first
    #[arg(short, long)]
    end: Option<f64>,

    /// Only whole loops of the pattern
    #[arg(short, long)]
    whole_loops: bool,
}

impl From<SolveArgs> for SolveInput {
    fn from(args: SolveArgs) -> Self {
        SolveInput {
            mode: args.mode,
            loops: args.loops,
            loop_multiplier: args.multiplier,
            total_ratio: args.ratio,
            terminal_multiplier: args.end,
            whole_loops: args.whole_loops,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e.message());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CommandResult<()> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { input } => {
            let summary = commands::inspect_source(&input, &config)?;
            emit(cli.json, &summary, print_summary)
        }
        Commands::Solve { input, solve } => {
            let output = commands::solve_source(&input, &SolveInput::from(solve), &config)?;
            emit(cli.json, &output, print_solve)
        }
        Commands::Generate {
            input,
            output,
            solve,
            dump,
            trace,
        } => {
            let request = GenerateInput {
                source: input,
                output,
                solve: SolveInput::from(solve),
                dump,
                trace,
            };
            let result = commands::generate_file(&request, &config)?;
            emit(cli.json, &result, print_generate)
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, print: fn(&T)) -> CommandResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

fn print_summary(summary: &GridSummary) {
    println!("Tracks:      {} ({} events)", summary.track_count, summary.event_count);
    println!("Time base:   {} ticks/beat", summary.ticks_per_beat);
    println!(
        "Tempo:       {:.2} BPM{}",
        summary.bpm,
        if summary.tempo_detected { "" } else { " (default)" }
    );
    if let Some(ts) = &summary.time_signature {
        println!("Meter:       {}", ts);
    }
    println!("Segments:    {}", summary.segment_count);
    println!("Duration:    {:.0} ticks", summary.source_duration);
    if let Some(fingerprint) = &summary.fingerprint {
        println!("SHA-256:     {}", fingerprint);
    }
}

fn print_solve(output: &SolveOutput) {
    println!("{} [{}]", output.status, output.mode);
    println!("Steps:       {} ({:.2} loops)", output.repetitions, output.loops);
    println!("Step mult:   {:.6}", output.step_multiplier);
    println!("Loop mult:   {:.5}", output.loop_multiplier);
    println!("Total ratio: {:.5}", output.total_ratio);
    println!("End mult:    {:.5}", output.terminal_multiplier);
    println!(
        "Drift:       {:.2} ticks / {:.2} ms ({})",
        output.error_ticks, output.error_ms, output.drift_grade
    );
}

fn print_generate(output: &GenerateOutput) {
    print_solve(&output.solve);
    for track in &output.tracks {
        println!(
            "Track {}:     {} events, {} notes",
            track.track, track.events, track.notes.matched
        );
    }
    println!("Wrote {} (end at {} ticks)", output.output_path, output.end_tick);
    if let Some(dump) = &output.dump_path {
        println!("Dump: {}", dump);
    }
}
