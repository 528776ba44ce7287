// Pipeline module - Progress tracing for transform runs

pub mod trace;

pub use trace::{read_trace_file, Stage, TraceBuilder, TraceEntry, TraceError, TraceWriter};
