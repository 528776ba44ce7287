// CycleSnap - Geometric time-warp for looping MIDI patterns
// Module declarations

pub mod commands;
pub mod config;
pub mod error;
pub mod grid;
pub mod midi;
pub mod pipeline;
pub mod solver;
pub mod transform;

pub use config::EngineConfig;
pub use error::{TransformError, TransformResult};
pub use grid::GridModel;
pub use solver::{solve, CalculationResult, SolveMode, SolveRequest};
pub use transform::TransformEngine;
