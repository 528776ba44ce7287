// MIDI model - Absolute-tick event sequences and Standard MIDI File I/O

pub mod file;
pub mod sequence;

pub use file::{encode_sequence, parse_sequence, read_bytes, write_sequence};
pub use sequence::{
    link_note_pairs, EventClass, EventKind, NoteLinkReport, Sequence, TimeSignature, TimedEvent,
    Track, MAX_TEMPO_MICROS, MIN_BPM,
};
