// MIDI File I/O - Standard MIDI File reading and writing using midly crate
// Converts between SMF delta-time tracks and the absolute-tick Sequence model

use std::fs;
use std::path::Path;

use midly::num::{u14, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, Track as SmfTrack,
    TrackEvent, TrackEventKind,
};

use super::sequence::{EventKind, Sequence, TimeSignature, TimedEvent, Track};
use crate::error::{TransformError, TransformResult};

/// Largest delta a track event can carry (28-bit variable length quantity)
const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Read raw bytes of a MIDI file from disk
pub fn read_bytes(path: &Path) -> TransformResult<Vec<u8>> {
    if !path.is_file() {
        return Err(TransformError::SourceUnavailable(format!(
            "File not found: {}",
            path.display()
        )));
    }

    fs::read(path).map_err(|e| {
        TransformError::SourceUnavailable(format!(
            "Could not open file stream {}: {}",
            path.display(),
            e
        ))
    })
}

/// Parse MIDI file bytes into a Sequence
pub fn parse_sequence(data: &[u8]) -> TransformResult<Sequence> {
    let smf = Smf::parse(data).map_err(|e| {
        TransformError::MalformedSource(format!("Corrupt or invalid MIDI file: {}", e))
    })?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => {
            return Err(TransformError::MalformedSource(
                "SMPTE timecode timing is not supported".to_string(),
            ));
        }
    };

    if smf.tracks.is_empty() {
        return Err(TransformError::MalformedSource(
            "MIDI file contains no tracks".to_string(),
        ));
    }

    let mut sequence = Sequence::new(ticks_per_beat);
    for track in smf.tracks.iter() {
        sequence.tracks.push(parse_track(track));
    }

    log::debug!(
        "Parsed MIDI file: {:?}, {} tracks, {} ticks per beat, {} events",
        smf.header.format,
        sequence.track_count(),
        ticks_per_beat,
        sequence.event_count()
    );

    Ok(sequence)
}

/// Convert a delta-time track into absolute ticks
fn parse_track(track: &SmfTrack) -> Track {
    let mut events = Vec::with_capacity(track.len());
    let mut current_tick = 0u64;

    for event in track.iter() {
        current_tick += event.delta.as_int() as u64;

        if let Some(kind) = convert_event(&event.kind) {
            events.push(TimedEvent::new(current_tick, kind));
        }
    }

    Track::from_events(events)
}

fn convert_event(kind: &TrackEventKind) -> Option<EventKind> {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            let event = match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Aftertouch { key, vel } => EventKind::Aftertouch {
                    channel,
                    key: key.as_int(),
                    pressure: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::Controller {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::ChannelAftertouch { vel } => EventKind::ChannelAftertouch {
                    channel,
                    pressure: vel.as_int(),
                },
                MidiMessage::PitchBend { bend } => EventKind::PitchBend {
                    channel,
                    bend: bend.0.as_int(),
                },
            };
            Some(event)
        }
        TrackEventKind::SysEx(data) => Some(EventKind::SysEx(data.to_vec())),
        TrackEventKind::Escape(data) => Some(EventKind::Escape(data.to_vec())),
        TrackEventKind::Meta(meta) => convert_meta(meta),
    }
}

fn raw_meta(kind: u8, data: &[u8]) -> EventKind {
    EventKind::Meta {
        kind,
        data: data.to_vec(),
    }
}

fn convert_meta(meta: &MetaMessage) -> Option<EventKind> {
    let event = match meta {
        MetaMessage::Tempo(us) => EventKind::Tempo(us.as_int()),
        MetaMessage::TimeSignature(numerator, denominator_pow2, clocks, thirty_seconds) => {
            EventKind::TimeSignature(TimeSignature {
                numerator: *numerator,
                denominator_pow2: *denominator_pow2,
                clocks_per_click: *clocks,
                thirty_seconds_per_quarter: *thirty_seconds,
            })
        }
        MetaMessage::EndOfTrack => EventKind::EndOfTrack,
        MetaMessage::TrackNumber(number) => match number {
            Some(n) => raw_meta(0x00, &n.to_be_bytes()),
            None => raw_meta(0x00, &[]),
        },
        MetaMessage::Text(data) => raw_meta(0x01, data),
        MetaMessage::Copyright(data) => raw_meta(0x02, data),
        MetaMessage::TrackName(data) => raw_meta(0x03, data),
        MetaMessage::InstrumentName(data) => raw_meta(0x04, data),
        MetaMessage::Lyric(data) => raw_meta(0x05, data),
        MetaMessage::Marker(data) => raw_meta(0x06, data),
        MetaMessage::CuePoint(data) => raw_meta(0x07, data),
        MetaMessage::ProgramName(data) => raw_meta(0x08, data),
        MetaMessage::DeviceName(data) => raw_meta(0x09, data),
        MetaMessage::MidiChannel(channel) => raw_meta(0x20, &[channel.as_int()]),
        MetaMessage::MidiPort(port) => raw_meta(0x21, &[port.as_int()]),
        MetaMessage::KeySignature(sharps, minor) => raw_meta(0x59, &[*sharps as u8, *minor as u8]),
        MetaMessage::SequencerSpecific(data) => raw_meta(0x7F, data),
        MetaMessage::Unknown(kind, data) => raw_meta(*kind, data),
        MetaMessage::SmpteOffset(_) => {
            // Offsets are meaningless once the timeline is re-timed
            log::debug!("Dropping SMPTE offset meta event");
            return None;
        }
    };

    Some(event)
}

/// Raw meta payload back to a typed midly message where one exists
fn meta_message(kind: u8, data: &[u8]) -> MetaMessage<'_> {
    match kind {
        0x01 => MetaMessage::Text(data),
        0x02 => MetaMessage::Copyright(data),
        0x03 => MetaMessage::TrackName(data),
        0x04 => MetaMessage::InstrumentName(data),
        0x05 => MetaMessage::Lyric(data),
        0x06 => MetaMessage::Marker(data),
        0x07 => MetaMessage::CuePoint(data),
        0x08 => MetaMessage::ProgramName(data),
        0x09 => MetaMessage::DeviceName(data),
        0x7F => MetaMessage::SequencerSpecific(data),
        _ => MetaMessage::Unknown(kind, data),
    }
}

fn event_kind_to_smf(kind: &EventKind) -> TrackEventKind<'_> {
    let midi = |channel: u8, message: MidiMessage| TrackEventKind::Midi {
        channel: channel.into(),
        message,
    };

    match kind {
        EventKind::NoteOn { channel, key, velocity } => midi(
            *channel,
            MidiMessage::NoteOn {
                key: (*key).into(),
                vel: (*velocity).into(),
            },
        ),
        EventKind::NoteOff { channel, key, velocity } => midi(
            *channel,
            MidiMessage::NoteOff {
                key: (*key).into(),
                vel: (*velocity).into(),
            },
        ),
        EventKind::Aftertouch { channel, key, pressure } => midi(
            *channel,
            MidiMessage::Aftertouch {
                key: (*key).into(),
                vel: (*pressure).into(),
            },
        ),
        EventKind::Controller { channel, controller, value } => midi(
            *channel,
            MidiMessage::Controller {
                controller: (*controller).into(),
                value: (*value).into(),
            },
        ),
        EventKind::ProgramChange { channel, program } => midi(
            *channel,
            MidiMessage::ProgramChange {
                program: (*program).into(),
            },
        ),
        EventKind::ChannelAftertouch { channel, pressure } => midi(
            *channel,
            MidiMessage::ChannelAftertouch {
                vel: (*pressure).into(),
            },
        ),
        EventKind::PitchBend { channel, bend } => midi(
            *channel,
            MidiMessage::PitchBend {
                bend: PitchBend(u14::from(*bend)),
            },
        ),
        EventKind::SysEx(data) => TrackEventKind::SysEx(data),
        EventKind::Escape(data) => TrackEventKind::Escape(data),
        EventKind::Tempo(us) => TrackEventKind::Meta(MetaMessage::Tempo((*us).into())),
        EventKind::TimeSignature(ts) => TrackEventKind::Meta(MetaMessage::TimeSignature(
            ts.numerator,
            ts.denominator_pow2,
            ts.clocks_per_click,
            ts.thirty_seconds_per_quarter,
        )),
        EventKind::Meta { kind, data } => TrackEventKind::Meta(meta_message(*kind, data)),
        EventKind::EndOfTrack => TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Convert absolute ticks to delta times
///
/// A gap wider than a 28-bit delta cannot be written without moving every
/// later event, so it fails instead.
fn track_to_smf(index: usize, track: &Track) -> TransformResult<SmfTrack<'_>> {
    let mut out = SmfTrack::with_capacity(track.len());
    let mut last_tick = 0u64;

    for event in &track.events {
        let gap = event.tick.saturating_sub(last_tick);
        if gap > MAX_DELTA {
            return Err(TransformError::Unencodable(format!(
                "track {}: gap of {} ticks at tick {} exceeds the {} tick delta limit",
                index, gap, event.tick, MAX_DELTA
            )));
        }

        let delta = gap as u32;
        out.push(TrackEvent {
            delta: u28::from(delta),
            kind: event_kind_to_smf(&event.kind),
        });
        last_tick = last_tick.max(event.tick);
    }

    Ok(out)
}

/// Encode a Sequence as Standard MIDI File bytes
///
/// Multi-track output is written as format 1 (parallel), a single track as format 0.
pub fn encode_sequence(sequence: &Sequence) -> TransformResult<Vec<u8>> {
    let format = if sequence.track_count() > 1 {
        Format::Parallel
    } else {
        Format::SingleTrack
    };

    let header = Header {
        format,
        timing: Timing::Metrical(sequence.ticks_per_beat.into()),
    };

    let smf = Smf {
        header,
        tracks: sequence
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| track_to_smf(index, track))
            .collect::<TransformResult<Vec<_>>>()?,
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes).map_err(|e| {
        TransformError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to write MIDI: {}", e),
        ))
    })?;

    Ok(bytes)
}

/// Write a Sequence to disk, replacing any existing file
pub fn write_sequence(path: &Path, sequence: &Sequence) -> TransformResult<()> {
    let bytes = encode_sequence(sequence)?;

    if path.is_file() {
        fs::remove_file(path)?;
    }
    fs::write(path, bytes)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sequence() -> Sequence {
        let mut seq = Sequence::new(480);

        let mut meta = Track::new();
        meta.push(0, EventKind::Meta { kind: 0x03, data: b"META".to_vec() });
        meta.push(0, EventKind::Tempo(500_000));
        meta.push(0, EventKind::TimeSignature(TimeSignature::four_four()));
        meta.push(0, EventKind::EndOfTrack);
        seq.tracks.push(meta);

        let mut notes = Track::new();
        notes.push(0, EventKind::NoteOn { channel: 9, key: 36, velocity: 100 });
        notes.push(240, EventKind::NoteOff { channel: 9, key: 36, velocity: 0 });
        notes.push(240, EventKind::PitchBend { channel: 9, bend: 8192 });
        notes.push(480, EventKind::Controller { channel: 9, controller: 7, value: 90 });
        notes.push(480, EventKind::EndOfTrack);
        seq.tracks.push(notes);

        seq
    }

    #[test]
    fn test_encode_produces_parallel_format() {
        let bytes = encode_sequence(&sample_sequence()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);
        assert_eq!(smf.header.timing, Timing::Metrical(480.into()));
    }

    #[test]
    fn test_single_track_uses_format_zero() {
        let mut seq = sample_sequence();
        seq.tracks.truncate(1);

        let bytes = encode_sequence(&seq).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
    }

    #[test]
    fn test_parse_restores_absolute_ticks() {
        let original = sample_sequence();
        let bytes = encode_sequence(&original).unwrap();
        let parsed = parse_sequence(&bytes).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_tempo_meta_encoding() {
        let bytes = encode_sequence(&sample_sequence()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let tempo = smf.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(500_000));
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let result = parse_sequence(b"definitely not a midi file");
        assert!(matches!(result, Err(TransformError::MalformedSource(_))));
    }

    #[test]
    fn test_parse_zero_tracks_is_malformed() {
        let smf = Smf {
            header: Header {
                format: Format::Parallel,
                timing: Timing::Metrical(480.into()),
            },
            tracks: Vec::new(),
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();

        let result = parse_sequence(&bytes);
        assert!(matches!(result, Err(TransformError::MalformedSource(_))));
    }

    #[test]
    fn test_read_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_bytes(&dir.path().join("missing.mid"));
        assert!(matches!(result, Err(TransformError::SourceUnavailable(_))));
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        fs::write(&path, b"stale").unwrap();

        write_sequence(&path, &sample_sequence()).unwrap();

        let bytes = read_bytes(&path).unwrap();
        assert_eq!(parse_sequence(&bytes).unwrap(), sample_sequence());
    }

    #[test]
    fn test_gap_beyond_delta_limit_is_rejected() {
        let mut seq = Sequence::new(960);
        let mut track = Track::new();
        track.push(0, EventKind::NoteOn { channel: 0, key: 60, velocity: 100 });
        track.push(MAX_DELTA + 1, EventKind::NoteOff { channel: 0, key: 60, velocity: 0 });
        track.push(MAX_DELTA + 1, EventKind::EndOfTrack);
        seq.tracks.push(track);

        let result = encode_sequence(&seq);
        assert!(matches!(result, Err(TransformError::Unencodable(_))));
    }

    #[test]
    fn test_gap_at_delta_limit_round_trips() {
        let mut seq = Sequence::new(960);
        let mut track = Track::new();
        track.push(0, EventKind::NoteOn { channel: 0, key: 60, velocity: 100 });
        track.push(MAX_DELTA, EventKind::NoteOff { channel: 0, key: 60, velocity: 0 });
        track.push(MAX_DELTA, EventKind::EndOfTrack);
        seq.tracks.push(track);

        let parsed = parse_sequence(&encode_sequence(&seq).unwrap()).unwrap();
        assert_eq!(parsed.tracks[0].end_tick(), MAX_DELTA);
    }
}
