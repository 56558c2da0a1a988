// Vector and score helpers shared by the scoring and diversity layers

use ndarray::ArrayView1;
use std::cmp::Ordering;

/// Cosine similarity of two vectors.
///
/// A zero vector on either side yields 0.0, which is how an empty
/// preference set contributes no signal. Vectors of different lengths are
/// not comparable and also yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = ArrayView1::from(&*v).dot(&ArrayView1::from(&*v)).sqrt();
    if norm >= f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Min-max scale a score column to [-1, 1].
///
/// A constant column (max == min) maps to all zeros. Any spread, however
/// small, is stretched to the full range.
pub fn min_max_signed(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if max <= min {
        values.iter_mut().for_each(|v| *v = 0.0);
    } else {
        values
            .iter_mut()
            .for_each(|v| *v = 2.0 * (*v - min) / (max - min) - 1.0);
    }
}

/// Round to 4 decimal places for logging
pub fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

/// Descending score order with NaN sorted after every real score
pub fn compare_scores_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
