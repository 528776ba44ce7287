// Grid lines and bucketing - Distinct timestamps, segment durations, nearest-line matching
// Works on plain tick positions so it can be tested without a MIDI model

/// Build the grid: 0 plus every timestamp further than `merge_tolerance`
/// from the last accepted line
///
/// `times` must be in ascending order.
pub fn extract_grid_lines<I>(times: I, merge_tolerance: f64) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut lines = vec![0.0];

    for t in times {
        let last = lines[lines.len() - 1];
        if t - last > merge_tolerance {
            lines.push(t);
        }
    }

    lines
}

/// Durations between consecutive grid lines
///
/// Fewer than two lines yields a single synthetic segment of `fallback_ticks`.
pub fn segment_deltas(grid_lines: &[f64], fallback_ticks: f64) -> Vec<f64> {
    if grid_lines.len() < 2 {
        return vec![fallback_ticks];
    }

    grid_lines.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Index of the grid line closest to `t` and the distance to it
///
/// Binary search over the sorted lines; on an exact tie the earlier line wins.
pub fn nearest_line(grid_lines: &[f64], t: f64) -> (usize, f64) {
    if grid_lines.is_empty() {
        return (0, t.abs());
    }

    let upper = grid_lines.partition_point(|&line| line < t);

    if upper == 0 {
        return (0, (grid_lines[0] - t).abs());
    }
    if upper == grid_lines.len() {
        let last = grid_lines.len() - 1;
        return (last, (t - grid_lines[last]).abs());
    }

    let below = (t - grid_lines[upper - 1]).abs();
    let above = (grid_lines[upper] - t).abs();

    if above < below {
        (upper, above)
    } else {
        (upper - 1, below)
    }
}

/// Bucket for an event at `t`
///
/// Nearest grid line, except that an event more than `match_tolerance` away
/// from every line and at or past `source_end` goes to the terminal bucket
/// (the last grid line).
pub fn assign_bucket(grid_lines: &[f64], t: f64, source_end: f64, match_tolerance: f64) -> usize {
    let (idx, distance) = nearest_line(grid_lines, t);

    if distance > match_tolerance && t >= source_end {
        grid_lines.len().saturating_sub(1)
    } else {
        idx
    }
}
