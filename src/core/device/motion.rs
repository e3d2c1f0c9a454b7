//! Motion interpolation
//! Turns a (position, duration) linear target into eased scalar samples.

/// Default cadence between two motion samples in milliseconds
pub const STEP_INTERVAL_MS: u32 = 30;

/// Easing curve applied to every sample, input clamped to `[0, 1]`.
pub fn ease(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    -0.8 * x.powi(2) + 1.8 * x
}

/// Builds the eased sample sequence for a move from `start` to `end`.
///
/// Only a move toward a lower position yields samples. Any such move, however
/// small, yields `round(duration_ms / step_ms)` of them, walking down from `start`
/// by `(start - end) * step_ms / duration_ms` per step. A move toward a higher
/// position yields nothing. Each call materializes an independent sequence.
pub fn interpolate(start: f64, end: f64, duration_ms: u32, step_ms: u32) -> Vec<f64> {
    if duration_ms == 0 || step_ms == 0 {
        return Vec::new();
    }

    let distance = start - end;
    if distance <= 0.0 {
        return Vec::new();
    }

    let steps = f64::from(duration_ms) / f64::from(step_ms);
    let delta = distance * f64::from(step_ms) / f64::from(duration_ms);
    let count = steps.round() as usize;

    (0..count).map(|i| ease(start - delta * i as f64)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_is_clamped() {
        assert_eq!(ease(-1.0), 0.0);
        assert_eq!(ease(0.0), 0.0);
        assert!((ease(1.0) - 1.0).abs() < 1e-12);
        assert!((ease(3.0) - 1.0).abs() < 1e-12);
        assert!((ease(0.5) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn downward_move_yields_one_sample_per_step() {
        let samples = interpolate(1.0, 0.0, 300, 30);
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(samples.windows(2).all(|w| w[0] >= w[1]));
        assert!((samples[0] - ease(1.0)).abs() < 1e-12);
        assert!((samples[9] - ease(0.1)).abs() < 1e-9);
    }

    // Known asymmetry: moving toward a higher position produces no samples.
    #[test]
    fn upward_move_yields_nothing() {
        assert!(interpolate(0.0, 1.0, 300, 30).is_empty());
        assert!(interpolate(0.5, 0.5, 300, 30).is_empty());
    }

    #[test]
    fn sequences_are_independent() {
        let first = interpolate(0.8, 0.2, 600, 30);
        let second = interpolate(0.8, 0.2, 600, 30);
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn degenerate_timing_yields_nothing() {
        assert!(interpolate(1.0, 0.0, 0, 30).is_empty());
        assert!(interpolate(1.0, 0.0, 300, 0).is_empty());
    }

    #[test]
    fn tiny_downward_move_still_spans_the_duration() {
        let samples = interpolate(0.51, 0.5, 300, 30);
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().all(|s| *s > ease(0.5) && *s <= ease(0.51)));
    }
}
