// Host commands - Serializable inputs and outputs over the transform engine
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::TransformError;
use crate::grid::{GridModel, GridSummary};
use crate::pipeline::{Stage, TraceBuilder, TraceEntry, TraceWriter};
use crate::solver::{CalculationResult, SolveMode, SolveRequest};
use crate::transform::{TrackStats, TransformEngine};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Load a configuration file, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> CommandResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_json_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

// ==================== INSPECT ====================

pub fn inspect_source(path: &Path, config: &EngineConfig) -> CommandResult<GridSummary> {
    let model = GridModel::load(path, config)?;
    Ok(model.summary())
}

// ==================== SOLVE ====================

/// Solve parameters as sent by a host; which fields are required depends on the mode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolveInput {
    pub mode: String,
    pub loops: Option<f64>,
    pub loop_multiplier: Option<f64>,
    pub total_ratio: Option<f64>,
    pub terminal_multiplier: Option<f64>,
    #[serde(default)]
    pub whole_loops: bool,
}

impl SolveInput {
    pub fn to_request(&self) -> CommandResult<SolveRequest> {
        let mode = SolveMode::from_name(&self.mode).ok_or_else(|| CommandError {
            message: format!(
                "Unknown mode '{}' (expected one of: {})",
                self.mode,
                SolveMode::ALL.map(|m| m.name()).join(", ")
            ),
        })?;

        let require = |field: &'static str, value: Option<f64>| {
            value.ok_or_else(|| {
                TransformError::invalid(field, format!("required for {}", mode.name()))
            })
        };

        let request = match mode {
            SolveMode::TargetTotalScale => SolveRequest::TargetTotalScale {
                loops: require("loops", self.loops)?,
                total_ratio: require("total_ratio", self.total_ratio)?,
            },
            SolveMode::FixedBeatRatio => SolveRequest::FixedBeatRatio {
                loops: require("loops", self.loops)?,
                loop_multiplier: require("loop_multiplier", self.loop_multiplier)?,
            },
            SolveMode::MatchBeatEnd => SolveRequest::MatchBeatEnd {
                loops: require("loops", self.loops)?,
                terminal_multiplier: require("terminal_multiplier", self.terminal_multiplier)?,
            },
            SolveMode::FitToCurve => SolveRequest::FitToCurve {
                loop_multiplier: require("loop_multiplier", self.loop_multiplier)?,
                total_ratio: require("total_ratio", self.total_ratio)?,
            },
            SolveMode::FitEndAndRatio => SolveRequest::FitEndAndRatio {
                terminal_multiplier: require("terminal_multiplier", self.terminal_multiplier)?,
                total_ratio: require("total_ratio", self.total_ratio)?,
            },
        };

        request.validate()?;
        Ok(request)
    }
}

/// Result surface shown to the host
#[derive(Debug, Clone, Serialize)]
pub struct SolveOutput {
    pub mode: String,
    pub status: String,
    pub repetitions: usize,
    pub loops: f64,
    pub step_multiplier: f64,
    pub loop_multiplier: f64,
    pub total_ratio: f64,
    pub terminal_multiplier: f64,
    pub error_ticks: f64,
    pub error_ms: f64,
    pub drift_grade: String,
}

impl From<&CalculationResult> for SolveOutput {
    fn from(result: &CalculationResult) -> Self {
        SolveOutput {
            mode: result.mode.name().to_string(),
            status: result.message.clone(),
            repetitions: result.repetitions,
            loops: result.loops(),
            step_multiplier: result.step_multiplier,
            loop_multiplier: result.loop_multiplier,
            total_ratio: result.total_ratio,
            terminal_multiplier: result.terminal_multiplier,
            error_ticks: result.error_ticks,
            error_ms: result.error_ms,
            drift_grade: result.drift_grade.label().to_string(),
        }
    }
}

/// Solve against a source file without generating anything
pub fn solve_source(
    source: &Path,
    input: &SolveInput,
    config: &EngineConfig,
) -> CommandResult<SolveOutput> {
    let request = input.to_request()?;

    let mut engine = TransformEngine::new(config.clone());
    engine.load_source(source)?;
    let result = engine.run_solver(&request, input.whole_loops)?;

    Ok(SolveOutput::from(&result))
}

// ==================== GENERATE ====================

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInput {
    pub source: PathBuf,
    pub output: PathBuf,
    pub solve: SolveInput,
    /// Write the debug dump next to the output
    #[serde(default)]
    pub dump: bool,
    /// Append stage entries to this JSONL file
    pub trace: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutput {
    pub solve: SolveOutput,
    pub tracks: Vec<TrackStats>,
    pub end_tick: u64,
    pub output_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_path: Option<String>,
}

/// Load, solve, regenerate and save in one call
pub fn generate_file(input: &GenerateInput, config: &EngineConfig) -> CommandResult<GenerateOutput> {
    let request = input.solve.to_request()?;
    let trace_writer = input.trace.clone().map(TraceWriter::new);

    let trace = |entry: TraceEntry| {
        if let Some(ref writer) = trace_writer {
            writer.record(&entry);
        }
    };

    let mut engine = TransformEngine::new(config.clone());

    // Load
    trace(TraceBuilder::stage(Stage::Load).start(format!("Loading {}", input.source.display())));
    let summary = engine.load_source(&input.source)?.summary();
    trace(
        TraceBuilder::stage(Stage::Load)
            .complete(format!("{} segments", summary.segment_count))
            .with_data(serde_json::to_value(&summary)?),
    );

    // Solve
    trace(TraceBuilder::stage(Stage::Solve).start(request.mode().name()));
    let result = engine.run_solver(&request, input.solve.whole_loops)?;
    trace(
        TraceBuilder::stage(Stage::Solve)
            .complete(result.message.clone())
            .with_data(serde_json::to_value(&result)?),
    );

    // Generate
    trace(TraceBuilder::stage(Stage::Generate).start(format!("{} steps", result.repetitions)));
    let regen = engine.generate_from(&result)?;
    let tracks = regen.track_stats();
    let end_tick = regen.end_tick();
    trace(
        TraceBuilder::stage(Stage::Generate)
            .complete(format!("End at {} ticks", end_tick))
            .with_data(serde_json::to_value(&tracks)?),
    );

    // Save
    trace(TraceBuilder::stage(Stage::Save).start(input.output.display().to_string()));
    engine.save(&input.output)?;

    let dump_path = if input.dump {
        let path = input.output.with_extension("txt");
        std::fs::write(&path, engine.debug_dump())?;
        Some(path.to_string_lossy().to_string())
    } else {
        None
    };
    trace(TraceBuilder::stage(Stage::Save).complete("Saved"));

    Ok(GenerateOutput {
        solve: SolveOutput::from(&result),
        tracks,
        end_tick,
        output_path: input.output.to_string_lossy().to_string(),
        dump_path,
    })
}
