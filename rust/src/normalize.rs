//! Min-max normalization of scoring signals.

/// Value assigned to every element of a constant signal.
pub const NEUTRAL: f64 = 0.5;

/// Rescale `values` linearly into `[0, 1]`, preserving positions.
///
/// A constant sequence (including a single value) maps to [`NEUTRAL`] so
/// that a signal with no spread contributes the same amount to every score.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if min == max {
        return vec![NEUTRAL; values.len()];
    }

    let span = max - min;
    values.iter().map(|&v| (v - min) / span).collect()
}
