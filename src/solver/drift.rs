// Quantization drift - Realized duration after integer-tick rounding
// Compares the rounded step durations against the ideal real-valued total

use serde::{Deserialize, Serialize};

/// How far a realized timeline drifts from the ideal one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Output/input ratio actually achieved with integer ticks
    pub realized_ratio: f64,

    /// |Σ rounded step durations − source_duration · ideal_ratio|
    pub error_ticks: f64,

    /// `error_ticks` converted with the tempo and time base
    pub error_ms: f64,
}

/// Drift quality bands shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftGrade {
    /// Below the tight threshold (10 ms by default)
    Tight,
    /// Below the loose threshold (30 ms by default)
    Loose,
    OutOfTolerance,
}

impl DriftGrade {
    pub fn from_ms(error_ms: f64, tight_ms: f64, loose_ms: f64) -> Self {
        if error_ms < tight_ms {
            DriftGrade::Tight
        } else if error_ms < loose_ms {
            DriftGrade::Loose
        } else {
            DriftGrade::OutOfTolerance
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DriftGrade::Tight => "tight",
            DriftGrade::Loose => "loose",
            DriftGrade::OutOfTolerance => "out of tolerance",
        }
    }
}

/// Milliseconds per tick at the given tempo and time base
pub fn ms_per_tick(bpm: f64, ticks_per_beat: u16) -> f64 {
    60000.0 / (bpm * ticks_per_beat as f64)
}

/// Exact (unrounded) duration of step `k`
pub fn step_duration(deltas: &[f64], k: usize, s_step: f64) -> f64 {
    deltas[k % deltas.len()] * s_step.powf(k as f64)
}

/// Round every step to the nearest tick and compare against the ideal total
///
/// Never fails; an empty pattern or zero duration yields a zero report.
pub fn measure_drift(
    deltas: &[f64],
    n_steps: usize,
    s_step: f64,
    source_duration: f64,
    ideal_ratio: f64,
    bpm: f64,
    ticks_per_beat: u16,
) -> DriftReport {
    if deltas.is_empty() || source_duration <= 0.0 {
        return DriftReport {
            realized_ratio: 0.0,
            error_ticks: 0.0,
            error_ms: 0.0,
        };
    }

    let quantized_ticks: f64 = (0..n_steps)
        .map(|k| step_duration(deltas, k, s_step).round())
        .sum();

    let ideal_ticks = source_duration * ideal_ratio;
    let error_ticks = (quantized_ticks - ideal_ticks).abs();

    DriftReport {
        realized_ratio: quantized_ticks / source_duration,
        error_ticks,
        error_ms: error_ticks * ms_per_tick(bpm, ticks_per_beat),
    }
}
