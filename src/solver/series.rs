// Series Math - Geometric series over a repeating segment pattern
// Ratio evaluation, bisection for the per-step multiplier, bounded scans for the step count

/// Tolerance for the linear (s = 1) shortcut and the bisection residual
pub const EPSILON: f64 = 1e-7;

/// Maximum bisection iterations
pub const MAX_BISECTION_ITERS: usize = 100;

/// Maximum upper-bound doublings while bracketing the root
pub const MAX_BRACKET_DOUBLINGS: usize = 30;

/// Initial bisection bracket
pub const BRACKET_LOW: f64 = 1e-4;
pub const BRACKET_HIGH: f64 = 2.0;

/// Distance from the linear ratio N/M treated as "no growth"
const LINEAR_TOLERANCE: f64 = 0.001;

/// Upper bound on candidate step counts for the forward scans
pub fn scan_limit(segment_count: usize) -> usize {
    1000.max(segment_count * 100)
}

/// Output/input duration ratio for `n_steps` steps growing by `s_step` per step
///
/// R = (Σ_{k=0}^{N-1} delta[k mod M] · s^k) / source_duration
///
/// Summed directly: the M-periodic weighting has no convenient closed form.
/// Within EPSILON of s = 1 the ratio degenerates to N / M.
pub fn evaluate_ratio(deltas: &[f64], n_steps: usize, s_step: f64, source_duration: f64) -> f64 {
    if deltas.is_empty() || source_duration <= EPSILON {
        return 0.0;
    }

    let m = deltas.len();

    if (s_step - 1.0).abs() < EPSILON {
        return n_steps as f64 / m as f64;
    }

    let mut total = 0.0;
    let mut scale = 1.0;
    for k in 0..n_steps {
        total += deltas[k % m] * scale;
        scale *= s_step;
    }

    total / source_duration
}

/// Per-step multiplier s such that `evaluate_ratio(deltas, n, s, dur) == target_ratio`
///
/// The ratio is monotonically increasing in s for s > 0, so bisection converges
/// once the root is bracketed. The upper bound doubles (at most 30 times) until
/// it brackets the target; an unreachable target returns the best bracket midpoint.
pub fn solve_multiplier(deltas: &[f64], n_steps: usize, target_ratio: f64, source_duration: f64) -> f64 {
    if deltas.is_empty() {
        return 1.0;
    }

    // Flat around the linear ratio
    let linear_ratio = n_steps as f64 / deltas.len() as f64;
    if (target_ratio - linear_ratio).abs() < LINEAR_TOLERANCE {
        return 1.0;
    }

    let mut low = BRACKET_LOW;
    let mut high = BRACKET_HIGH;

    let mut doublings = 0;
    while evaluate_ratio(deltas, n_steps, high, source_duration) < target_ratio
        && doublings < MAX_BRACKET_DOUBLINGS
    {
        high *= 2.0;
        doublings += 1;
    }

    for _ in 0..MAX_BISECTION_ITERS {
        let mid = low + (high - low) * 0.5;
        let r_mid = evaluate_ratio(deltas, n_steps, mid, source_duration);

        if (r_mid - target_ratio).abs() < EPSILON {
            return mid;
        }

        if r_mid < target_ratio {
            low = mid;
        } else {
            high = mid;
        }
    }

    low + (high - low) * 0.5
}

/// Best step count for a fixed per-step multiplier
///
/// Scans N = stride, 2·stride, ... up to `scan_limit(M)` and keeps the candidate
/// closest to `target_ratio`. Stops early once the curve has crossed the target
/// and the error starts growing.
pub fn solve_repetition_count(
    deltas: &[f64],
    s_step: f64,
    target_ratio: f64,
    source_duration: f64,
    stride: usize,
) -> usize {
    let stride = stride.max(1);
    let limit = scan_limit(deltas.len());

    let mut min_diff = f64::MAX;
    let mut best_n = stride;

    let mut k = stride;
    while k <= limit {
        let r = evaluate_ratio(deltas, k, s_step, source_duration);
        let diff = (r - target_ratio).abs();

        if diff < min_diff {
            min_diff = diff;
            best_n = k;
        }

        if r > target_ratio && diff > min_diff {
            break;
        }

        k += stride;
    }

    best_n
}

/// Best step count when the terminal multiplier E = s^(N-1) is pinned
///
/// Each candidate N derives its own s = E^(1/(N-1)) before evaluating R.
/// Since s moves with N, R(N) need not be monotone and the early stop makes
/// the result a best-effort nearest match, not a verified optimum.
/// With E ≈ 1 there is no growth and N = round(R · M), snapped to the stride.
pub fn solve_repetition_count_with_fixed_end(
    deltas: &[f64],
    target_end: f64,
    target_ratio: f64,
    source_duration: f64,
    stride: usize,
) -> usize {
    let stride = stride.max(1);

    if (target_end - 1.0).abs() < LINEAR_TOLERANCE {
        let n = clamp_step_count(target_ratio * deltas.len() as f64, deltas.len());
        return snap_to_stride(n, stride);
    }

    let limit = scan_limit(deltas.len());

    // A curve needs at least two points
    let start = stride.max(2);

    let mut min_diff = f64::MAX;
    let mut best_n = start;

    let mut k = start;
    while k <= limit {
        let s_step = step_multiplier_from_end(target_end, k);
        let r = evaluate_ratio(deltas, k, s_step, source_duration);
        let diff = (r - target_ratio).abs();

        if diff < min_diff {
            min_diff = diff;
            best_n = k;
        }

        if r > target_ratio && diff > min_diff {
            break;
        }

        k += stride;
    }

    best_n
}

/// Per-step multiplier that reaches `terminal` on the last of `n_steps` steps
pub fn step_multiplier_from_end(terminal: f64, n_steps: usize) -> f64 {
    if n_steps > 1 {
        terminal.powf(1.0 / (n_steps - 1) as f64)
    } else {
        1.0
    }
}

/// Round a real-valued step count, capped at `scan_limit(M)`
pub fn clamp_step_count(steps: f64, segment_count: usize) -> usize {
    let limit = scan_limit(segment_count);
    let rounded = steps.round().max(0.0);

    if rounded > limit as f64 {
        log::warn!("Step count {:.3e} capped at {}", steps, limit);
        limit
    } else {
        rounded as usize
    }
}

/// Nearest multiple of `stride` (half rounds up), never below one stride
pub fn snap_to_stride(n: usize, stride: usize) -> usize {
    let stride = stride.max(1);
    let snapped = (n.saturating_add(stride / 2) / stride) * stride;
    snapped.max(stride)
}
