//! Descriptor comparator — Euclidean distance and the distance-to-similarity curve.

use crate::error::CoreError;
use crate::policy::DecisionPolicy;
use crate::types::Descriptor;

/// Euclidean (L2) distance between two descriptors of equal length.
///
/// Always processes every dimension. Fails when lengths differ or when both
/// descriptors carry a model version and the versions disagree.
pub fn distance(a: &Descriptor, b: &Descriptor) -> Result<f32, CoreError> {
    if a.values.len() != b.values.len() {
        return Err(CoreError::DimensionMismatch {
            left: a.values.len(),
            right: b.values.len(),
        });
    }
    if let (Some(left), Some(right)) = (&a.model_version, &b.model_version) {
        if left != right {
            return Err(CoreError::ModelMismatch {
                left: left.clone(),
                right: right.clone(),
            });
        }
    }

    Ok(a.values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Map a distance to a similarity in [0, 1].
///
/// Piecewise: 1.0 up to `low_threshold`, 0.0 from `high_threshold`, and
/// `1 - distance / mid_scale` (floored at 0) in between. The middle segment
/// is deliberately not an interpolation between the two thresholds; stored
/// acceptance thresholds were tuned against this exact curve.
pub fn to_similarity_score(distance: f32, policy: &DecisionPolicy) -> f32 {
    if distance <= policy.low_threshold {
        1.0
    } else if distance >= policy.high_threshold {
        0.0
    } else {
        // f32::max drops NaN, so a NaN distance lands on 0.0
        (1.0 - distance / policy.mid_scale).max(0.0).min(1.0)
    }
}
