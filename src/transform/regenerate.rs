// Regeneration - Replays the bucketed source along a geometrically warped timeline
// Step k plays source segment k mod M, scaled by s^k

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{TransformError, TransformResult};
use crate::grid::{BucketedEvent, GridModel};
use crate::midi::{link_note_pairs, EventKind, NoteLinkReport, Sequence, TimedEvent, Track};

/// Timestamps closer than this are ordered by event class instead of time
pub const TIE_TOLERANCE: f64 = 1e-6;

/// A regenerated sequence and its per-track note pairing results
#[derive(Debug, Clone)]
pub struct Regeneration {
    pub sequence: Sequence,

    /// One report per output track
    pub link_reports: Vec<NoteLinkReport>,

    /// Exact (unrounded) time of the final step boundary
    pub final_cursor: f64,

    pub steps: usize,
    pub step_multiplier: f64,
}

/// Per-track statistics for the host and the debug dump
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStats {
    pub track: usize,
    pub events: usize,
    pub end_tick: u64,
    pub notes: NoteLinkReport,
}

impl Regeneration {
    pub fn track_stats(&self) -> Vec<TrackStats> {
        self.sequence
            .tracks
            .iter()
            .zip(&self.link_reports)
            .enumerate()
            .map(|(track, (t, notes))| TrackStats {
                track,
                events: t.len(),
                end_tick: t.end_tick(),
                notes: *notes,
            })
            .collect()
    }

    /// Tick of the last event over all tracks
    pub fn end_tick(&self) -> u64 {
        self.sequence.tracks.iter().map(Track::end_tick).max().unwrap_or(0)
    }
}

/// An event awaiting sort and rounding
#[derive(Debug, Clone)]
struct PendingEvent {
    time: f64,
    kind: EventKind,
}

/// Per-track buffers of pending events
struct TrackBuffers {
    tracks: Vec<Vec<PendingEvent>>,
}

impl TrackBuffers {
    fn new(track_count: usize) -> Self {
        TrackBuffers {
            tracks: vec![Vec::new(); track_count.max(1)],
        }
    }

    fn push(&mut self, track: usize, time: f64, kind: EventKind) {
        // Events from tracks past the source count land on the last track
        let idx = track.min(self.tracks.len() - 1);
        self.tracks[idx].push(PendingEvent { time, kind });
    }

    /// Emit a bucket at `anchor`, scaling each groove offset by `scale`
    fn emit_bucket(&mut self, bucket: &[BucketedEvent], anchor: f64, scale: f64) {
        for event in bucket {
            let time = (anchor + event.offset * scale).max(0.0);
            self.push(event.track, time, event.kind.clone());
        }
    }
}

/// Walk N steps of the source pattern with per-step multiplier `s_step`
pub fn regenerate(
    model: &GridModel,
    n_steps: usize,
    s_step: f64,
    config: &EngineConfig,
) -> TransformResult<Regeneration> {
    let m = model.segment_count();
    if m == 0 || model.buckets.len() < m + 1 {
        return Err(TransformError::EmptySegmentation);
    }
    if !(s_step.is_finite() && s_step > 0.0) {
        return Err(TransformError::invalid(
            "step_multiplier",
            format!("must be > 0 (got {})", s_step),
        ));
    }

    let mut buffers = TrackBuffers::new(model.track_count());

    // Single global tempo and meter
    let time_signature = model.time_signature.unwrap_or(config.default_time_signature);
    buffers.push(0, 0.0, EventKind::Tempo(model.tempo_micros));
    buffers.push(0, 0.0, EventKind::TimeSignature(time_signature));

    // Bucket 0 opens the run unscaled
    buffers.emit_bucket(&model.buckets[0], 0.0, 1.0);

    let mut cursor = 0.0;
    let mut scale = 1.0;

    for k in 0..n_steps {
        let segment = k % m;
        cursor += model.deltas[segment] * scale;

        let next = segment + 1;
        if next < m {
            buffers.emit_bucket(&model.buckets[next], cursor, scale);
        } else {
            // Loop boundary: the source's terminal events, then the next loop's opening bucket
            buffers.emit_bucket(&model.buckets[m], cursor, scale);
            if k + 1 < n_steps {
                buffers.emit_bucket(&model.buckets[0], cursor, scale);
            }
        }

        scale *= s_step;
    }

    let mut sequence = Sequence::new(model.ticks_per_beat);
    let mut link_reports = Vec::with_capacity(buffers.tracks.len());

    for (idx, mut pending) in buffers.tracks.into_iter().enumerate() {
        let last_time = pending.iter().map(|e| e.time).fold(cursor, f64::max);
        pending.push(PendingEvent {
            time: last_time,
            kind: EventKind::EndOfTrack,
        });

        sort_pending(&mut pending);

        let events: Vec<TimedEvent> = pending
            .into_iter()
            .map(|e| TimedEvent::new(e.time.round() as u64, e.kind))
            .collect();

        let report = link_note_pairs(&events);
        if !report.is_clean() {
            log::warn!(
                "Track {}: {} dangling note-on, {} orphan note-off",
                idx,
                report.dangling_on,
                report.orphan_off
            );
        }
        log::debug!("Track {}: {} events, {} notes", idx, events.len(), report.matched);

        link_reports.push(report);
        sequence.tracks.push(Track::from_events(events));
    }

    log::info!(
        "Generated {} steps, {} tracks, {} events, end at {:.0} ticks",
        n_steps,
        sequence.track_count(),
        sequence.event_count(),
        cursor
    );

    Ok(Regeneration {
        sequence,
        link_reports,
        final_cursor: cursor,
        steps: n_steps,
        step_multiplier: s_step,
    })
}

/// Stable sort by time; within TIE_TOLERANCE, by event class
fn sort_pending(events: &mut [PendingEvent]) {
    events.sort_by_key(|e| (tie_key(e.time), e.kind.class()));
}

/// Time quantized to the tie tolerance so the sort key is a total order
fn tie_key(time: f64) -> i64 {
    (time / TIE_TOLERANCE).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{EventClass, TimeSignature};

    fn note_on(tick: u64, key: u8) -> TimedEvent {
        TimedEvent::new(tick, EventKind::NoteOn { channel: 0, key, velocity: 100 })
    }

    fn note_off(tick: u64, key: u8) -> TimedEvent {
        TimedEvent::new(tick, EventKind::NoteOff { channel: 0, key, velocity: 0 })
    }

    /// Two 480-tick segments: note 60 then note 62
    fn two_beat_model() -> GridModel {
        let mut seq = Sequence::new(960);
        seq.tracks.push(Track::from_events(vec![
            note_on(0, 60),
            note_off(480, 60),
            note_on(480, 62),
            note_off(960, 62),
            TimedEvent::new(960, EventKind::EndOfTrack),
        ]));
        GridModel::from_sequence(seq, &EngineConfig::default()).unwrap()
    }

    fn ticks_of(track: &Track) -> Vec<u64> {
        track.events.iter().map(|e| e.tick).collect()
    }

    #[test]
    fn test_linear_walk_repeats_pattern() {
        let model = two_beat_model();
        let out = regenerate(&model, 4, 1.0, &EngineConfig::default()).unwrap();

        assert_eq!(out.sequence.track_count(), 1);
        assert_eq!(out.sequence.ticks_per_beat, 960);
        let track = &out.sequence.tracks[0];

        // tempo, meter, then notes every 480 ticks
        assert_eq!(
            ticks_of(track),
            vec![0, 0, 0, 480, 480, 960, 960, 1440, 1440, 1920, 1920]
        );
        assert!(matches!(track.events[0].kind, EventKind::Tempo(500_000)));
        assert!(matches!(track.events[1].kind, EventKind::TimeSignature(_)));
        assert!(track.events.last().unwrap().kind.is_end_of_track());
        assert_eq!(out.final_cursor, 1920.0);

        let report = out.link_reports[0];
        assert_eq!(report.matched, 4);
        assert!(report.is_clean());
    }

    #[test]
    fn test_segments_are_exactly_480_ticks_at_unit_multiplier() {
        let model = two_beat_model();
        let out = regenerate(&model, 6, 1.0, &EngineConfig::default()).unwrap();

        let note_on_ticks: Vec<u64> = out.sequence.tracks[0]
            .events
            .iter()
            .filter(|e| e.kind.is_note_on())
            .map(|e| e.tick)
            .collect();

        assert_eq!(note_on_ticks, vec![0, 480, 960, 1440, 1920, 2400]);
        for pair in note_on_ticks.windows(2) {
            assert_eq!(pair[1] - pair[0], 480);
        }
    }

    #[test]
    fn test_growing_walk_scales_segments() {
        let model = two_beat_model();
        let out = regenerate(&model, 4, 1.1, &EngineConfig::default()).unwrap();

        // 480, 480+528, +580.8, +638.88
        let boundaries: Vec<u64> = out.sequence.tracks[0]
            .events
            .iter()
            .filter(|e| e.kind.is_note_off())
            .map(|e| e.tick)
            .collect();

        assert_eq!(boundaries, vec![480, 1008, 1589, 2228]);
        assert!((out.final_cursor - 2227.68).abs() < 1e-6);
        assert_eq!(out.end_tick(), 2228);
    }

    #[test]
    fn test_note_off_sorts_before_note_on_at_shared_tick() {
        let model = two_beat_model();
        let out = regenerate(&model, 4, 1.0, &EngineConfig::default()).unwrap();
        let events = &out.sequence.tracks[0].events;

        for pair in events.windows(2) {
            if pair[0].tick == pair[1].tick {
                assert!(pair[0].kind.class() <= pair[1].kind.class());
            }
        }

        let at_960: Vec<&EventKind> = events.iter().filter(|e| e.tick == 960).map(|e| &e.kind).collect();
        assert!(at_960[0].is_note_off());
        assert!(at_960[1].is_note_on());
    }

    #[test]
    fn test_last_step_does_not_open_another_loop() {
        let model = two_beat_model();
        let out = regenerate(&model, 2, 1.0, &EngineConfig::default()).unwrap();
        let track = &out.sequence.tracks[0];

        let note_ons = track.events.iter().filter(|e| e.kind.is_note_on()).count();
        assert_eq!(note_ons, 2);
        assert_eq!(track.end_tick(), 960);
        assert!(out.link_reports[0].is_clean());
    }

    #[test]
    fn test_partial_loop_leaves_dangling_note() {
        let model = two_beat_model();
        let out = regenerate(&model, 3, 1.0, &EngineConfig::default()).unwrap();

        // Step 2 opens note 62 but the run ends before it closes
        let report = out.link_reports[0];
        assert_eq!(report.matched, 3);
        assert_eq!(report.dangling_on, 1);
        assert_eq!(report.orphan_off, 0);

        let ons = out.sequence.tracks[0].events.iter().filter(|e| e.kind.is_note_on()).count();
        let offs = out.sequence.tracks[0].events.iter().filter(|e| e.kind.is_note_off()).count();
        assert_eq!(ons, 4);
        assert_eq!(offs, 3);
    }

    #[test]
    fn test_groove_offsets_scale_with_segment() {
        let config = EngineConfig {
            grid_merge_tolerance: 20.0,
            ..EngineConfig::default()
        };

        let mut seq = Sequence::new(480);
        seq.tracks.push(Track::from_events(vec![
            note_on(0, 60),
            note_off(480, 60),
            note_on(490, 62),
            note_off(960, 62),
        ]));
        let model = GridModel::from_sequence(seq, &config).unwrap();
        assert_eq!(model.grid_lines, vec![0.0, 480.0, 960.0]);

        let out = regenerate(&model, 4, 2.0, &config).unwrap();
        let note_62: Vec<u64> = out.sequence.tracks[0]
            .events
            .iter()
            .filter(|e| e.kind.is_note_on() && e.kind.note_key() == Some((0, 62)))
            .map(|e| e.tick)
            .collect();

        // Step 0 ends at 480 (offset 10 · 1); step 2 ends at 480+960+1920 (offset 10 · 4)
        assert_eq!(note_62, vec![490, 3400]);
    }

    #[test]
    fn test_tracks_keep_their_events() {
        let mut seq = Sequence::new(960);
        seq.tracks.push(Track::from_events(vec![
            TimedEvent::new(0, EventKind::Tempo(400_000)),
            TimedEvent::new(0, EventKind::EndOfTrack),
        ]));
        seq.tracks.push(Track::from_events(vec![
            note_on(0, 36),
            note_off(480, 36),
            note_on(480, 38),
            note_off(960, 38),
        ]));
        let model = GridModel::from_sequence(seq, &EngineConfig::default()).unwrap();

        let out = regenerate(&model, 4, 1.0, &EngineConfig::default()).unwrap();
        assert_eq!(out.sequence.track_count(), 2);

        let conductor = &out.sequence.tracks[0];
        assert_eq!(conductor.len(), 3);
        assert!(matches!(conductor.events[0].kind, EventKind::Tempo(400_000)));
        assert_eq!(conductor.end_tick(), 1920);

        let drums = &out.sequence.tracks[1];
        assert_eq!(out.link_reports[1].matched, 4);
        assert!(drums.events.iter().all(|e| !e.kind.is_global_meta()));
    }

    #[test]
    fn test_source_time_signature_is_carried() {
        let meter = TimeSignature {
            numerator: 3,
            denominator_pow2: 2,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        };

        let mut seq = Sequence::new(960);
        seq.tracks.push(Track::from_events(vec![
            TimedEvent::new(0, EventKind::TimeSignature(meter)),
            note_on(0, 60),
            note_off(960, 60),
        ]));
        let model = GridModel::from_sequence(seq, &EngineConfig::default()).unwrap();

        let out = regenerate(&model, 2, 1.0, &EngineConfig::default()).unwrap();
        let meters: Vec<&EventKind> = out.sequence.tracks[0]
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::TimeSignature(_)))
            .map(|e| &e.kind)
            .collect();

        assert_eq!(meters, vec![&EventKind::TimeSignature(meter)]);
    }

    #[test]
    fn test_zero_steps_emits_only_opening_bucket() {
        let model = two_beat_model();
        let out = regenerate(&model, 0, 1.0, &EngineConfig::default()).unwrap();

        let track = &out.sequence.tracks[0];
        assert_eq!(track.len(), 4);
        assert_eq!(track.end_tick(), 0);
    }

    #[test]
    fn test_empty_segmentation() {
        let mut model = two_beat_model();
        model.deltas.clear();

        let result = regenerate(&model, 4, 1.0, &EngineConfig::default());
        assert!(matches!(result, Err(TransformError::EmptySegmentation)));
    }

    #[test]
    fn test_tie_key_groups_near_identical_times() {
        assert_eq!(tie_key(100.0), tie_key(100.0 + 1e-7));
        assert!(tie_key(100.0) < tie_key(100.00001));
        assert!(EventClass::Meta < EventClass::NoteOff);
        assert!(EventClass::NoteOff < EventClass::NoteOn);
        assert!(EventClass::Other < EventClass::EndOfTrack);
    }
}
