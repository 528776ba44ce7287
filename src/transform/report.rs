// Debug dump - Plain-text summary of the loaded source and the regenerated output

use std::fmt::Write;

use super::regenerate::Regeneration;
use crate::grid::GridModel;
use crate::midi::Sequence;
use crate::solver::CalculationResult;

/// Render the dump; any missing piece is reported as such
pub fn render_dump(
    model: Option<&GridModel>,
    result: Option<&CalculationResult>,
    output: Option<&Regeneration>,
) -> String {
    let mut text = String::new();

    let _ = write_dump(&mut text, model, result, output);
    text
}

fn write_dump(
    out: &mut String,
    model: Option<&GridModel>,
    result: Option<&CalculationResult>,
    output: Option<&Regeneration>,
) -> std::fmt::Result {
    writeln!(out, "=== SOURCE ===")?;
    match model {
        Some(model) => {
            if let Some(fingerprint) = &model.fingerprint {
                writeln!(out, "sha256: {}", fingerprint)?;
            }
            writeln!(
                out,
                "time base: {} ticks/beat, tempo: {:.2} BPM{}",
                model.ticks_per_beat,
                model.bpm,
                if model.tempo_detected { "" } else { " (default)" }
            )?;
            writeln!(
                out,
                "segments: {}, duration: {:.0} ticks, terminal events: {}",
                model.segment_count(),
                model.source_duration,
                model.terminal_bucket().len()
            )?;
            write_tracks(out, &model.source)?;
        }
        None => writeln!(out, "(no source loaded)")?,
    }

    writeln!(out)?;
    writeln!(out, "=== SOLVE ===")?;
    match result {
        Some(r) => {
            writeln!(out, "{} ({})", r.message, r.mode.display_name())?;
            writeln!(
                out,
                "N: {} ({:.2} loops), s: {:.6}, loop: {:.5}, R: {:.5}, E: {:.5}",
                r.repetitions,
                r.loops(),
                r.step_multiplier,
                r.loop_multiplier,
                r.total_ratio,
                r.terminal_multiplier
            )?;
            writeln!(
                out,
                "drift: {:.2} ticks, {:.2} ms ({})",
                r.error_ticks,
                r.error_ms,
                r.drift_grade.label()
            )?;
        }
        None => writeln!(out, "(not solved)")?,
    }

    writeln!(out)?;
    writeln!(out, "=== OUTPUT ===")?;
    match output {
        Some(regen) => {
            writeln!(
                out,
                "steps: {}, s: {:.6}, end: {} ticks",
                regen.steps,
                regen.step_multiplier,
                regen.end_tick()
            )?;
            for stats in regen.track_stats() {
                writeln!(
                    out,
                    "track {}: {} events, notes matched {}, dangling {}, orphan {}",
                    stats.track,
                    stats.events,
                    stats.notes.matched,
                    stats.notes.dangling_on,
                    stats.notes.orphan_off
                )?;
            }
        }
        None => writeln!(out, "(nothing generated)")?,
    }

    Ok(())
}

fn write_tracks(out: &mut String, sequence: &Sequence) -> std::fmt::Result {
    for (idx, track) in sequence.tracks.iter().enumerate() {
        writeln!(
            out,
            "track {}: {} events, end {} ticks",
            idx,
            track.len(),
            track.end_tick()
        )?;
    }
    Ok(())
}
