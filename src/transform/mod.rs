// Transform module - Regeneration of a warped sequence from a grid model

pub mod engine;
pub mod regenerate;
pub mod report;

pub use engine::TransformEngine;
pub use regenerate::{regenerate, Regeneration, TrackStats, TIE_TOLERANCE};
pub use report::render_dump;
