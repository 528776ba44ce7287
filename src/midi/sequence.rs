// In-memory MIDI model - Tracks of absolute-tick events
// Owned counterpart of a parsed Standard MIDI File, independent of the wire encoding

use serde::{Deserialize, Serialize};

/// Largest tempo a set-tempo meta can carry (24-bit microseconds per beat)
pub const MAX_TEMPO_MICROS: u32 = 0xFF_FFFF;

/// Slowest tempo in BPM whose microseconds per beat still fit in 24 bits
pub const MIN_BPM: f64 = 60_000_000.0 / MAX_TEMPO_MICROS as f64;

/// Time signature meta payload (numerator, denominator as power of two,
/// MIDI clocks per metronome click, 32nd notes per quarter note)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator_pow2: u8,
    pub clocks_per_click: u8,
    pub thirty_seconds_per_quarter: u8,
}

impl TimeSignature {
    /// Common time (4/4)
    pub fn four_four() -> Self {
        TimeSignature {
            numerator: 4,
            denominator_pow2: 2, // 2^2 = 4 (quarter note)
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        }
    }

    /// Denominator as a note value (4 = quarter note)
    pub fn denominator(&self) -> u32 {
        1u32 << self.denominator_pow2.min(31)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

/// Kind of a single MIDI event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    Aftertouch { channel: u8, key: u8, pressure: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// Raw 14-bit bend value, 8192 = center
    PitchBend { channel: u8, bend: u16 },
    SysEx(Vec<u8>),
    Escape(Vec<u8>),
    /// Microseconds per quarter note
    Tempo(u32),
    TimeSignature(TimeSignature),
    /// Any other meta event, kept as its raw type byte and payload
    Meta { kind: u8, data: Vec<u8> },
    EndOfTrack,
}

/// Ordering class used to break ties between events sharing a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventClass {
    Meta = 0,
    NoteOff = 1,
    NoteOn = 2,
    Other = 3,
    EndOfTrack = 4,
}

impl EventKind {
    pub fn class(&self) -> EventClass {
        match self {
            EventKind::Tempo(_) | EventKind::TimeSignature(_) | EventKind::Meta { .. } => {
                EventClass::Meta
            }
            EventKind::EndOfTrack => EventClass::EndOfTrack,
            _ if self.is_note_off() => EventClass::NoteOff,
            EventKind::NoteOn { .. } => EventClass::NoteOn,
            _ => EventClass::Other,
        }
    }

    /// Note-off, including the running-status idiom of note-on with velocity 0
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            EventKind::NoteOff { .. } | EventKind::NoteOn { velocity: 0, .. }
        )
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, EventKind::NoteOn { velocity, .. } if *velocity > 0)
    }

    pub fn is_end_of_track(&self) -> bool {
        matches!(self, EventKind::EndOfTrack)
    }

    /// Global metadata that is written once at t=0 instead of being replayed
    pub fn is_global_meta(&self) -> bool {
        matches!(self, EventKind::Tempo(_) | EventKind::TimeSignature(_))
    }

    /// (channel, key) of a note event
    pub fn note_key(&self) -> Option<(u8, u8)> {
        match self {
            EventKind::NoteOn { channel, key, .. } | EventKind::NoteOff { channel, key, .. } => {
                Some((*channel, *key))
            }
            _ => None,
        }
    }
}

/// An event at an absolute tick position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u64,
    pub kind: EventKind,
}

impl TimedEvent {
    pub fn new(tick: u64, kind: EventKind) -> Self {
        TimedEvent { tick, kind }
    }
}

/// One track: events ordered by absolute tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub events: Vec<TimedEvent>,
}

impl Track {
    pub fn new() -> Self {
        Track { events: Vec::new() }
    }

    pub fn from_events(events: Vec<TimedEvent>) -> Self {
        Track { events }
    }

    pub fn push(&mut self, tick: u64, kind: EventKind) {
        self.events.push(TimedEvent::new(tick, kind));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick of the last event (0 for an empty track)
    pub fn end_tick(&self) -> u64 {
        self.events.iter().map(|e| e.tick).max().unwrap_or(0)
    }

    /// Number of events that are not end-of-track markers
    pub fn content_len(&self) -> usize {
        self.events.iter().filter(|e| !e.kind.is_end_of_track()).count()
    }
}

/// A multi-track sequence with a metrical time base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Ticks per quarter note (0 = unknown)
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

impl Sequence {
    pub fn new(ticks_per_beat: u16) -> Self {
        Sequence {
            ticks_per_beat,
            tracks: Vec::new(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    /// All events of all tracks in one time-ordered view
    ///
    /// Stable: at equal ticks, lower track index first, then original order
    /// within the track.
    pub fn merged(&self) -> Vec<(usize, &TimedEvent)> {
        let mut merged: Vec<(usize, &TimedEvent)> = self
            .tracks
            .iter()
            .enumerate()
            .flat_map(|(track_idx, track)| track.events.iter().map(move |e| (track_idx, e)))
            .collect();

        merged.sort_by_key(|(_, e)| e.tick);
        merged
    }

    /// First tempo event in time order, in microseconds per beat
    pub fn first_tempo(&self) -> Option<u32> {
        self.merged().into_iter().find_map(|(_, e)| match e.kind {
            EventKind::Tempo(us) => Some(us),
            _ => None,
        })
    }

    /// First time signature event in time order
    pub fn first_time_signature(&self) -> Option<TimeSignature> {
        self.merged().into_iter().find_map(|(_, e)| match e.kind {
            EventKind::TimeSignature(ts) => Some(ts),
            _ => None,
        })
    }
}

/// Outcome of re-linking note-on/note-off pairs on a track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLinkReport {
    pub matched: usize,
    /// Note-ons never closed by a note-off
    pub dangling_on: usize,
    /// Note-offs with no open note-on
    pub orphan_off: usize,
}

impl NoteLinkReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_on == 0 && self.orphan_off == 0
    }
}

/// Pair note-ons with note-offs per (channel, key), first-in first-out
///
/// Expects events in playback order.
pub fn link_note_pairs(events: &[TimedEvent]) -> NoteLinkReport {
    use std::collections::HashMap;

    let mut open: HashMap<(u8, u8), usize> = HashMap::new();
    let mut report = NoteLinkReport::default();

    for event in events {
        let Some(key) = event.kind.note_key() else {
            continue;
        };

        if event.kind.is_note_off() {
            match open.get_mut(&key) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    report.matched += 1;
                }
                _ => report.orphan_off += 1,
            }
        } else if event.kind.is_note_on() {
            *open.entry(key).or_insert(0) += 1;
        }
    }

    report.dangling_on = open.values().sum();
    report
}
