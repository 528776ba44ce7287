// Solver module - Geometric time series over a repeating segment pattern
// Pure numerics: no I/O, no MIDI types

pub mod drift;
pub mod series;
pub mod solve;

pub use drift::{measure_drift, ms_per_tick, DriftGrade, DriftReport};
pub use series::{
    evaluate_ratio, solve_multiplier, solve_repetition_count,
    solve_repetition_count_with_fixed_end, step_multiplier_from_end,
};
pub use solve::{solve, steps_from_loops, CalculationResult, SolveContext, SolveMode, SolveRequest};
