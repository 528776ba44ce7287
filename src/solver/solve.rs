// Geometric Time Solver - Relates step count, multiplier, total ratio and terminal scale
// Five solve modes, each fixing two quantities and solving for the rest

use serde::{Deserialize, Serialize};

use super::drift::{measure_drift, DriftGrade};
use super::series::{
    clamp_step_count, evaluate_ratio, snap_to_stride, solve_multiplier, solve_repetition_count,
    solve_repetition_count_with_fixed_end, step_multiplier_from_end,
};
use crate::config::EngineConfig;
use crate::error::{TransformError, TransformResult};

/// Which quantities are locked and which are solved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolveMode {
    /// Fixed loops, total ratio -> solve multiplier
    TargetTotalScale,
    /// Fixed loops, per-loop multiplier -> solve total ratio
    FixedBeatRatio,
    /// Fixed loops, terminal multiplier -> solve multiplier and total ratio
    MatchBeatEnd,
    /// Fixed per-loop multiplier, total ratio -> solve step count
    FitToCurve,
    /// Fixed terminal multiplier, total ratio -> solve step count and multiplier
    FitEndAndRatio,
}

impl SolveMode {
    pub const ALL: [SolveMode; 5] = [
        SolveMode::TargetTotalScale,
        SolveMode::FixedBeatRatio,
        SolveMode::MatchBeatEnd,
        SolveMode::FitToCurve,
        SolveMode::FitEndAndRatio,
    ];

    /// Parse a mode name; accepts kebab-case, snake_case and PascalCase
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(|c| c.to_lowercase())
            .collect();

        SolveMode::ALL
            .into_iter()
            .find(|mode| mode.name().replace('-', "") == normalized)
    }

    /// Kebab-case name used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            SolveMode::TargetTotalScale => "target-total-scale",
            SolveMode::FixedBeatRatio => "fixed-beat-ratio",
            SolveMode::MatchBeatEnd => "match-beat-end",
            SolveMode::FitToCurve => "fit-to-curve",
            SolveMode::FitEndAndRatio => "fit-end-and-ratio",
        }
    }

    /// Short description of locked inputs
    pub fn display_name(&self) -> &'static str {
        match self {
            SolveMode::TargetTotalScale => "LOOP TARGET [Fix N, R]",
            SolveMode::FixedBeatRatio => "LOOP ACCEL  [Fix N, s]",
            SolveMode::MatchBeatEnd => "LOOP FINAL  [Fix N, E]",
            SolveMode::FitToCurve => "CURVE FIT   [Fix s, R]",
            SolveMode::FitEndAndRatio => "END FIT     [Fix E, R]",
        }
    }
}

/// A solve request: one variant per mode, carrying only the inputs it locks
///
/// `loops` counts full passes over the source pattern; it becomes
/// N = round(loops · M) steps. Multipliers given per loop relate to the
/// per-step multiplier by loop_multiplier = s^M.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SolveRequest {
    TargetTotalScale { loops: f64, total_ratio: f64 },
    FixedBeatRatio { loops: f64, loop_multiplier: f64 },
    MatchBeatEnd { loops: f64, terminal_multiplier: f64 },
    FitToCurve { loop_multiplier: f64, total_ratio: f64 },
    FitEndAndRatio { terminal_multiplier: f64, total_ratio: f64 },
}

impl SolveRequest {
    pub fn mode(&self) -> SolveMode {
        match self {
            SolveRequest::TargetTotalScale { .. } => SolveMode::TargetTotalScale,
            SolveRequest::FixedBeatRatio { .. } => SolveMode::FixedBeatRatio,
            SolveRequest::MatchBeatEnd { .. } => SolveMode::MatchBeatEnd,
            SolveRequest::FitToCurve { .. } => SolveMode::FitToCurve,
            SolveRequest::FitEndAndRatio { .. } => SolveMode::FitEndAndRatio,
        }
    }

    /// Check that every locked input is positive and finite
    pub fn validate(&self) -> TransformResult<()> {
        match *self {
            SolveRequest::TargetTotalScale { loops, total_ratio } => {
                require_positive("loops", loops)?;
                require_positive("total_ratio", total_ratio)
            }
            SolveRequest::FixedBeatRatio { loops, loop_multiplier } => {
                require_positive("loops", loops)?;
                require_positive("loop_multiplier", loop_multiplier)
            }
            SolveRequest::MatchBeatEnd { loops, terminal_multiplier } => {
                require_positive("loops", loops)?;
                require_positive("terminal_multiplier", terminal_multiplier)
            }
            SolveRequest::FitToCurve { loop_multiplier, total_ratio } => {
                require_positive("loop_multiplier", loop_multiplier)?;
                require_positive("total_ratio", total_ratio)
            }
            SolveRequest::FitEndAndRatio { terminal_multiplier, total_ratio } => {
                require_positive("terminal_multiplier", terminal_multiplier)?;
                require_positive("total_ratio", total_ratio)
            }
        }
    }
}

fn require_positive(field: &'static str, value: f64) -> TransformResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TransformError::invalid(field, format!("must be > 0 (got {})", value)))
    }
}

/// Segment pattern and timing the solver works against
#[derive(Debug, Clone, Copy)]
pub struct SolveContext<'a> {
    /// Duration of each source segment, in ticks
    pub deltas: &'a [f64],

    /// Σ deltas
    pub source_duration: f64,

    /// Tempo for drift conversion (non-positive = use the configured default)
    pub bpm: f64,

    /// Time base for drift conversion (0 = use the configured default)
    pub ticks_per_beat: u16,

    /// Restrict step counts to whole passes over the pattern
    pub whole_loops: bool,
}

/// Solved parameters plus drift diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub mode: SolveMode,

    /// Human-readable status
    pub message: String,

    /// N: total integer steps to generate
    pub repetitions: usize,

    /// M: segments in one loop of the source pattern
    pub segment_count: usize,

    /// s: multiplier applied per step
    pub step_multiplier: f64,

    /// s^M: multiplier applied per full loop
    pub loop_multiplier: f64,

    /// R: output duration / source duration
    pub total_ratio: f64,

    /// E: scale of the last step relative to the first
    pub terminal_multiplier: f64,

    /// R actually achieved after rounding every step to integer ticks
    pub realized_ratio: f64,

    /// Rounding drift in ticks
    pub error_ticks: f64,

    /// Rounding drift in milliseconds
    pub error_ms: f64,

    pub drift_grade: DriftGrade,
}

impl CalculationResult {
    /// Step count expressed in loops of the source pattern
    pub fn loops(&self) -> f64 {
        self.repetitions as f64 / self.segment_count.max(1) as f64
    }
}

/// Convert a loop count to steps, optionally snapped to whole loops
///
/// Capped at the forward-scan limit so every later sum stays bounded.
pub fn steps_from_loops(loops: f64, segment_count: usize, whole_loops: bool) -> usize {
    let m = segment_count.max(1);
    let n = clamp_step_count(loops * m as f64, m);

    if whole_loops {
        snap_to_stride(n, m)
    } else {
        n.max(1)
    }
}

/// Solve the requested mode against a segment pattern
///
/// An empty pattern is replaced by one segment of `fallback_segment_ticks`,
/// so no mode ever divides by zero.
pub fn solve(
    request: &SolveRequest,
    ctx: &SolveContext,
    config: &EngineConfig,
) -> TransformResult<CalculationResult> {
    request.validate()?;

    let fallback = [config.fallback_segment_ticks];
    let (deltas, source_duration) = if ctx.deltas.is_empty() || ctx.source_duration <= 0.0 {
        (&fallback[..], config.fallback_segment_ticks)
    } else {
        (ctx.deltas, ctx.source_duration)
    };

    let m = deltas.len();
    let stride = if ctx.whole_loops { m } else { 1 };

    let loop_to_step = |loop_multiplier: f64| loop_multiplier.powf(1.0 / m as f64);
    let step_to_loop = |step_multiplier: f64| step_multiplier.powf(m as f64);
    let end_from_step = |s: f64, n: usize| s.powf(n.saturating_sub(1) as f64);

    let (repetitions, step_multiplier, total_ratio, terminal_multiplier, message) = match *request {
        SolveRequest::TargetTotalScale { loops, total_ratio } => {
            let n = steps_from_loops(loops, m, ctx.whole_loops);
            let s = solve_multiplier(deltas, n, total_ratio, source_duration);
            (n, s, total_ratio, end_from_step(s, n), "Solved Beat Ratio")
        }
        SolveRequest::FixedBeatRatio { loops, loop_multiplier } => {
            let n = steps_from_loops(loops, m, ctx.whole_loops);
            let s = loop_to_step(loop_multiplier);
            let r = evaluate_ratio(deltas, n, s, source_duration);
            (n, s, r, end_from_step(s, n), "Calculated Total Scale")
        }
        SolveRequest::MatchBeatEnd { loops, terminal_multiplier } => {
            let n = steps_from_loops(loops, m, ctx.whole_loops);
            let s = step_multiplier_from_end(terminal_multiplier, n);
            let r = evaluate_ratio(deltas, n, s, source_duration);
            (n, s, r, end_from_step(s, n), "Solved Ratio from End")
        }
        SolveRequest::FitToCurve { loop_multiplier, total_ratio } => {
            let s = loop_to_step(loop_multiplier);
            let n = solve_repetition_count(deltas, s, total_ratio, source_duration, stride);
            (n, s, total_ratio, end_from_step(s, n), "Solved Repetitions (Curve)")
        }
        SolveRequest::FitEndAndRatio { terminal_multiplier, total_ratio } => {
            let n = solve_repetition_count_with_fixed_end(
                deltas,
                terminal_multiplier,
                total_ratio,
                source_duration,
                stride,
            );
            let s = step_multiplier_from_end(terminal_multiplier, n);
            (n, s, total_ratio, terminal_multiplier, "Solved Repetitions (End+Ratio)")
        }
    };

    let bpm = if ctx.bpm > 0.0 { ctx.bpm } else { config.default_bpm };
    let ticks_per_beat = config.effective_ticks_per_beat(ctx.ticks_per_beat);

    let drift = measure_drift(
        deltas,
        repetitions,
        step_multiplier,
        source_duration,
        total_ratio,
        bpm,
        ticks_per_beat,
    );
    let drift_grade = DriftGrade::from_ms(drift.error_ms, config.drift_tight_ms, config.drift_loose_ms);

    let result = CalculationResult {
        mode: request.mode(),
        message: message.to_string(),
        repetitions,
        segment_count: m,
        step_multiplier,
        loop_multiplier: step_to_loop(step_multiplier),
        total_ratio,
        terminal_multiplier,
        realized_ratio: drift.realized_ratio,
        error_ticks: drift.error_ticks,
        error_ms: drift.error_ms,
        drift_grade,
    };

    log::info!(
        "{}: N={} ({:.2} loops), s={:.6}, loop={:.5}, R={:.5}, E={:.5}",
        result.message,
        result.repetitions,
        result.loops(),
        result.step_multiplier,
        result.loop_multiplier,
        result.total_ratio,
        result.terminal_multiplier
    );

    if drift_grade == DriftGrade::Tight {
        log::info!("Drift: {:.2} ticks ({:.2} ms)", result.error_ticks, result.error_ms);
    } else {
        log::warn!(
            "Drift {}: {:.2} ticks ({:.2} ms)",
            drift_grade.label(),
            result.error_ticks,
            result.error_ms
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(deltas: &[f64], whole_loops: bool) -> SolveContext<'_> {
        SolveContext {
            deltas,
            source_duration: deltas.iter().sum(),
            bpm: 120.0,
            ticks_per_beat: 960,
            whole_loops,
        }
    }

    #[test]
    fn test_mode_names_round_trip() {
        for mode in SolveMode::ALL {
            assert_eq!(SolveMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(SolveMode::from_name("fit_to_curve"), Some(SolveMode::FitToCurve));
        assert_eq!(SolveMode::from_name("MatchBeatEnd"), Some(SolveMode::MatchBeatEnd));
        assert_eq!(SolveMode::from_name("sideways"), None);
    }

    #[test]
    fn test_steps_from_loops() {
        assert_eq!(steps_from_loops(4.0, 2, false), 8);
        assert_eq!(steps_from_loops(1.3, 4, false), 5);
        assert_eq!(steps_from_loops(1.3, 4, true), 4);
        assert_eq!(steps_from_loops(1.5, 4, true), 8);
        assert_eq!(steps_from_loops(0.01, 4, false), 1);
        assert_eq!(steps_from_loops(0.01, 4, true), 4);
    }

    #[test]
    fn test_target_total_scale_solves_multiplier() {
        let deltas = [240.0, 480.0, 240.0];
        let request = SolveRequest::TargetTotalScale { loops: 4.0, total_ratio: 6.0 };
        let result = solve(&request, &ctx(&deltas, true), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 12);
        assert_eq!(result.segment_count, 3);
        assert!(result.step_multiplier > 1.0);
        let r = evaluate_ratio(&deltas, 12, result.step_multiplier, 960.0);
        assert!((r - 6.0).abs() < 1e-6);
        assert!((result.loop_multiplier - result.step_multiplier.powi(3)).abs() < 1e-9);
        assert!((result.terminal_multiplier - result.step_multiplier.powi(11)).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_then_target_round_trip() {
        let deltas = [120.0, 360.0, 240.0, 240.0];
        let config = EngineConfig::default();

        let fixed = SolveRequest::FixedBeatRatio { loops: 3.0, loop_multiplier: 1.25 };
        let forward = solve(&fixed, &ctx(&deltas, false), &config).unwrap();

        let target = SolveRequest::TargetTotalScale {
            loops: 3.0,
            total_ratio: forward.total_ratio,
        };
        let back = solve(&target, &ctx(&deltas, false), &config).unwrap();

        assert_eq!(back.repetitions, forward.repetitions);
        assert!((back.step_multiplier - forward.step_multiplier).abs() < 1e-4);
        assert!((back.loop_multiplier - 1.25).abs() < 1e-3);
    }

    #[test]
    fn test_match_beat_end() {
        let deltas = [480.0, 480.0];
        let request = SolveRequest::MatchBeatEnd { loops: 2.0, terminal_multiplier: 8.0 };
        let result = solve(&request, &ctx(&deltas, false), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 4);
        assert!((result.step_multiplier - 2.0).abs() < 1e-9);
        assert!((result.terminal_multiplier - 8.0).abs() < 1e-9);
        // 480 * (1 + 2 + 4 + 8) / 960
        assert!((result.total_ratio - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_fit_to_curve_linear() {
        let deltas = [480.0, 480.0];
        let request = SolveRequest::FitToCurve { loop_multiplier: 1.0, total_ratio: 3.0 };
        let result = solve(&request, &ctx(&deltas, false), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 6);
        assert_eq!(result.total_ratio, 3.0);
        assert_eq!(result.error_ticks, 0.0);
    }

    #[test]
    fn test_fit_end_and_ratio_whole_loops() {
        let deltas = [100.0, 200.0, 300.0];
        let request = SolveRequest::FitEndAndRatio { terminal_multiplier: 2.0, total_ratio: 5.0 };
        let result = solve(&request, &ctx(&deltas, true), &EngineConfig::default()).unwrap();

        assert!(result.repetitions > 0);
        assert_eq!(result.repetitions % 3, 0);
        assert_eq!(result.terminal_multiplier, 2.0);
        let s = step_multiplier_from_end(2.0, result.repetitions);
        assert!((result.step_multiplier - s).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_inputs_are_rejected() {
        let deltas = [480.0, 480.0];
        let config = EngineConfig::default();
        let cases = [
            (SolveRequest::TargetTotalScale { loops: 0.0, total_ratio: 2.0 }, "loops"),
            (SolveRequest::TargetTotalScale { loops: 2.0, total_ratio: -1.0 }, "total_ratio"),
            (SolveRequest::FixedBeatRatio { loops: 2.0, loop_multiplier: 0.0 }, "loop_multiplier"),
            (SolveRequest::MatchBeatEnd { loops: 2.0, terminal_multiplier: 0.0 }, "terminal_multiplier"),
            (SolveRequest::FitToCurve { loop_multiplier: 1.5, total_ratio: 0.0 }, "total_ratio"),
            (SolveRequest::FitEndAndRatio { terminal_multiplier: -2.0, total_ratio: 2.0 }, "terminal_multiplier"),
        ];

        for (request, expected_field) in cases {
            match solve(&request, &ctx(&deltas, false), &config) {
                Err(TransformError::InvalidParameter { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected InvalidParameter, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_degenerate_source_uses_fallback_segment() {
        let config = EngineConfig::default();
        let empty = SolveContext {
            deltas: &[],
            source_duration: 0.0,
            bpm: 0.0,
            ticks_per_beat: 0,
            whole_loops: false,
        };

        for request in [
            SolveRequest::TargetTotalScale { loops: 2.0, total_ratio: 3.0 },
            SolveRequest::FixedBeatRatio { loops: 2.0, loop_multiplier: 1.5 },
            SolveRequest::MatchBeatEnd { loops: 2.0, terminal_multiplier: 2.0 },
            SolveRequest::FitToCurve { loop_multiplier: 1.1, total_ratio: 3.0 },
            SolveRequest::FitEndAndRatio { terminal_multiplier: 2.0, total_ratio: 3.0 },
        ] {
            let result = solve(&request, &empty, &config).unwrap();
            assert_eq!(result.segment_count, 1);
            assert!(result.repetitions > 0);
            assert!(result.total_ratio.is_finite());
            assert!(result.error_ms.is_finite());
        }
    }

    #[test]
    fn test_drift_fields_and_grade() {
        let deltas = [480.0, 480.0];
        let request = SolveRequest::FixedBeatRatio { loops: 2.0, loop_multiplier: 1.21 };
        let result = solve(&request, &ctx(&deltas, false), &EngineConfig::default()).unwrap();

        // s = 1.1 per step
        assert!((result.step_multiplier - 1.1).abs() < 1e-12);
        let exact: Vec<f64> = (0..4).map(|k| 480.0 * 1.1f64.powi(k)).collect();
        let rounded: f64 = exact.iter().map(|d| d.round()).sum();
        let ideal: f64 = exact.iter().sum();

        assert!((result.error_ticks - (rounded - ideal).abs()).abs() < 1e-6);
        assert!((result.realized_ratio - rounded / 960.0).abs() < 1e-12);
        assert_eq!(result.drift_grade, DriftGrade::Tight);
    }

    #[test]
    fn test_loops_view() {
        let deltas = [240.0, 240.0, 240.0, 240.0];
        let request = SolveRequest::FixedBeatRatio { loops: 2.5, loop_multiplier: 1.0 };
        let result = solve(&request, &ctx(&deltas, false), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 10);
        assert!((result.loops() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_huge_loop_count_is_capped() {
        let deltas = [480.0, 480.0];
        let config = EngineConfig::default();
        let request = SolveRequest::FixedBeatRatio { loops: 1e300, loop_multiplier: 1.0 };

        for whole_loops in [true, false] {
            let result = solve(&request, &ctx(&deltas, whole_loops), &config).unwrap();
            assert_eq!(result.repetitions, 1000);
            assert_eq!(result.total_ratio, 500.0);
            assert!(result.error_ms.is_finite());
        }
    }

    #[test]
    fn test_huge_target_ratio_with_loop_count_finishes() {
        let deltas = [240.0, 480.0, 240.0];
        let request = SolveRequest::TargetTotalScale { loops: 1e300, total_ratio: 1e300 };
        let result = solve(&request, &ctx(&deltas, false), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 1000);
        assert!(result.step_multiplier.is_finite());
    }

    #[test]
    fn test_huge_ratio_with_unit_end_is_capped() {
        let deltas = [100.0, 200.0, 300.0];
        let request = SolveRequest::FitEndAndRatio { terminal_multiplier: 1.0, total_ratio: 1e300 };
        let result = solve(&request, &ctx(&deltas, true), &EngineConfig::default()).unwrap();

        assert_eq!(result.repetitions, 999);
        assert_eq!(result.repetitions % 3, 0);
        assert_eq!(result.step_multiplier, 1.0);
    }
}
