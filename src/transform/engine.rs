// Transform Engine - Load, solve, regenerate and save
// Holds the loaded grid model and the last generated sequence between calls

use std::path::Path;

use super::regenerate::{regenerate, Regeneration};
use super::report::render_dump;
use crate::config::EngineConfig;
use crate::error::{TransformError, TransformResult};
use crate::grid::GridModel;
use crate::midi::{self, Sequence};
use crate::solver::{self, CalculationResult, SolveContext, SolveRequest};

/// Stateful front end over the grid model, solver and regeneration
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    config: EngineConfig,
    model: Option<GridModel>,
    last_result: Option<CalculationResult>,
    generated: Option<Regeneration>,
}

impl TransformEngine {
    pub fn new(config: EngineConfig) -> Self {
        TransformEngine {
            config,
            model: None,
            last_result: None,
            generated: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&GridModel> {
        self.model.as_ref()
    }

    pub fn last_result(&self) -> Option<&CalculationResult> {
        self.last_result.as_ref()
    }

    pub fn generated(&self) -> Option<&Regeneration> {
        self.generated.as_ref()
    }

    /// Load a source file; on failure the engine is left with no source
    pub fn load_source(&mut self, path: &Path) -> TransformResult<&GridModel> {
        self.clear();
        let model = GridModel::load(path, &self.config)?;
        Ok(self.model.insert(model))
    }

    /// Use an in-memory sequence as the source
    pub fn set_source(&mut self, sequence: Sequence) -> TransformResult<&GridModel> {
        self.clear();
        let model = GridModel::from_sequence(sequence, &self.config)?;
        Ok(self.model.insert(model))
    }

    fn clear(&mut self) {
        self.model = None;
        self.last_result = None;
        self.generated = None;
    }

    /// Solve against the loaded pattern
    ///
    /// Without a source the fallback single segment is used.
    pub fn run_solver(
        &mut self,
        request: &SolveRequest,
        whole_loops: bool,
    ) -> TransformResult<CalculationResult> {
        let ctx = match &self.model {
            Some(model) => model.solve_context(whole_loops),
            None => SolveContext {
                deltas: &[],
                source_duration: 0.0,
                bpm: self.config.default_bpm,
                ticks_per_beat: self.config.default_ticks_per_beat,
                whole_loops,
            },
        };

        let result = solver::solve(request, &ctx, &self.config)?;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Regenerate N steps at per-step multiplier s
    pub fn generate(&mut self, n_steps: usize, s_step: f64) -> TransformResult<&Regeneration> {
        let model = self.model.as_ref().ok_or(TransformError::NoSourceLoaded)?;
        let regen = regenerate(model, n_steps, s_step, &self.config)?;
        Ok(self.generated.insert(regen))
    }

    /// Regenerate with the parameters of a solve result
    pub fn generate_from(&mut self, result: &CalculationResult) -> TransformResult<&Regeneration> {
        self.generate(result.repetitions, result.step_multiplier)
    }

    /// Write the last generated sequence, replacing any existing file
    pub fn save(&self, path: &Path) -> TransformResult<()> {
        let regen = self.generated.as_ref().ok_or(TransformError::NothingGenerated)?;
        midi::write_sequence(path, &regen.sequence)?;

        log::info!(
            "Saved {} tracks to {}",
            regen.sequence.track_count(),
            path.display()
        );
        Ok(())
    }

    pub fn debug_dump(&self) -> String {
        render_dump(
            self.model.as_ref(),
            self.last_result.as_ref(),
            self.generated.as_ref(),
        )
    }
}
