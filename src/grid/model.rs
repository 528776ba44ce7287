// Grid Model - Segmented view of a multi-track source
// Grid lines, segment durations and per-line event buckets with groove offsets

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::bucket::{assign_bucket, extract_grid_lines, segment_deltas};
use crate::config::EngineConfig;
use crate::error::{TransformError, TransformResult};
use crate::midi::{self, EventKind, Sequence, TimeSignature, MAX_TEMPO_MICROS};
use crate::solver::SolveContext;

/// One source event stored relative to its bucket's grid line
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedEvent {
    /// Index of the originating track
    pub track: usize,

    pub kind: EventKind,

    /// Event time minus the bucket's grid line, in ticks
    pub offset: f64,
}

/// Segmented timeline of one loaded source
///
/// Rebuilt from scratch on every load; never mutated in place.
#[derive(Debug, Clone)]
pub struct GridModel {
    /// The parsed source this model was built from
    pub source: Sequence,

    /// Strictly increasing grid timestamps, starting at 0
    pub grid_lines: Vec<f64>,

    /// Duration of each segment (M entries)
    pub deltas: Vec<f64>,

    /// Σ deltas
    pub source_duration: f64,

    /// M + 1 buckets: one per grid line, the last one is the terminal bucket
    pub buckets: Vec<Vec<BucketedEvent>>,

    /// Global tempo in microseconds per beat
    pub tempo_micros: u32,

    /// Global tempo in beats per minute
    pub bpm: f64,

    /// Whether the tempo came from the source or the configured default
    pub tempo_detected: bool,

    /// First time signature in the source, if any
    pub time_signature: Option<TimeSignature>,

    /// Effective ticks per beat (source value, or the configured default)
    pub ticks_per_beat: u16,

    /// SHA-256 of the source bytes when loaded from a file
    pub fingerprint: Option<String>,
}

/// Summary shown by `inspect` and the debug dump
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSummary {
    pub track_count: usize,
    pub event_count: usize,
    pub ticks_per_beat: u16,
    pub bpm: f64,
    pub tempo_detected: bool,
    pub time_signature: Option<String>,
    pub segment_count: usize,
    pub source_duration: f64,
    pub terminal_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl GridModel {
    /// Read, parse and segment a Standard MIDI File
    pub fn load(path: &Path, config: &EngineConfig) -> TransformResult<Self> {
        let bytes = midi::read_bytes(path)?;
        let sequence = midi::parse_sequence(&bytes)?;

        let mut model = Self::from_sequence(sequence, config)?;
        model.fingerprint = Some(fingerprint(&bytes));

        log::info!("Loaded {}", path.display());
        Ok(model)
    }

    /// Segment an in-memory sequence
    pub fn from_sequence(source: Sequence, config: &EngineConfig) -> TransformResult<Self> {
        if source.tracks.is_empty() {
            return Err(TransformError::MalformedSource(
                "Sequence has no tracks".to_string(),
            ));
        }

        let ticks_per_beat = config.effective_ticks_per_beat(source.ticks_per_beat);

        let (tempo_micros, tempo_detected) = match source.first_tempo() {
            Some(us) if us > 0 => (us, true),
            _ => (micros_per_beat(config.default_bpm), false),
        };
        let bpm = 60_000_000.0 / tempo_micros as f64;
        let time_signature = source.first_time_signature();

        // End-of-track markers would add a trailing grid line
        let merged: Vec<(usize, &midi::TimedEvent)> = source
            .merged()
            .into_iter()
            .filter(|(_, e)| !e.kind.is_end_of_track())
            .collect();

        let grid_lines = extract_grid_lines(
            merged.iter().map(|(_, e)| e.tick as f64),
            config.grid_merge_tolerance,
        );
        let deltas = segment_deltas(&grid_lines, config.fallback_segment_ticks);
        let source_duration: f64 = deltas.iter().sum();
        let source_end = grid_lines[grid_lines.len() - 1];

        let mut buckets: Vec<Vec<BucketedEvent>> = vec![Vec::new(); deltas.len() + 1];

        for (track, event) in merged {
            // Written once at t=0 on regeneration
            if event.kind.is_global_meta() {
                continue;
            }

            let t = event.tick as f64;
            let idx = assign_bucket(&grid_lines, t, source_end, config.bucket_match_tolerance);
            let line = grid_lines.get(idx).copied().unwrap_or(0.0);

            buckets[idx].push(BucketedEvent {
                track,
                kind: event.kind.clone(),
                offset: t - line,
            });
        }

        log::info!(
            "Grid: {} tracks, {} ticks/beat, {:.2} BPM{}, {} segments, {:.0} ticks",
            source.track_count(),
            ticks_per_beat,
            bpm,
            if tempo_detected { "" } else { " (default)" },
            deltas.len(),
            source_duration
        );
        for (idx, bucket) in buckets.iter().enumerate() {
            if !bucket.is_empty() {
                log::debug!("Bucket {}: {} events", idx, bucket.len());
            }
        }

        Ok(GridModel {
            source,
            grid_lines,
            deltas,
            source_duration,
            buckets,
            tempo_micros,
            bpm,
            tempo_detected,
            time_signature,
            ticks_per_beat,
            fingerprint: None,
        })
    }

    /// M: number of segments in one loop of the pattern
    pub fn segment_count(&self) -> usize {
        self.deltas.len()
    }

    pub fn track_count(&self) -> usize {
        self.source.track_count()
    }

    /// Events recorded at or past the last grid line
    pub fn terminal_bucket(&self) -> &[BucketedEvent] {
        self.buckets.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Solver input for this pattern
    pub fn solve_context(&self, whole_loops: bool) -> SolveContext<'_> {
        SolveContext {
            deltas: &self.deltas,
            source_duration: self.source_duration,
            bpm: self.bpm,
            ticks_per_beat: self.ticks_per_beat,
            whole_loops,
        }
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary {
            track_count: self.track_count(),
            event_count: self.source.event_count(),
            ticks_per_beat: self.ticks_per_beat,
            bpm: self.bpm,
            tempo_detected: self.tempo_detected,
            time_signature: self
                .time_signature
                .map(|ts| format!("{}/{}", ts.numerator, ts.denominator())),
            segment_count: self.segment_count(),
            source_duration: self.source_duration,
            terminal_events: self.terminal_bucket().len(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Microseconds per beat for a tempo in BPM, capped at the 24-bit tempo range
pub fn micros_per_beat(bpm: f64) -> u32 {
    (60_000_000.0 / bpm).round().min(MAX_TEMPO_MICROS as f64) as u32
}

/// Hex SHA-256 of the source bytes
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
