// Grid module - Segmentation of a source into grid lines and event buckets

pub mod bucket;
pub mod model;

pub use bucket::{assign_bucket, extract_grid_lines, nearest_line, segment_deltas};
pub use model::{fingerprint, micros_per_beat, BucketedEvent, GridModel, GridSummary};
