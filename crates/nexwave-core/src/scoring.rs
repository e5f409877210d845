//! Confidence scoring for a photo's representative face.
//!
//! The boost stack is applied in a fixed order (cosine tier, corroboration,
//! detector score) and every step is capped at 100. The order matters for
//! ranking of near-threshold photos.

use crate::policy::MatchPolicy;
use crate::types::MatchCandidate;

const MAX_CONFIDENCE: f32 = 100.0;

/// Linear score: 100 at distance 0, 0 at `threshold` and beyond.
fn linear_score(distance: f32, threshold: f32) -> f32 {
    (1.0 - distance / threshold).max(0.0) * MAX_CONFIDENCE
}

fn finish(score: f32) -> u8 {
    score.round().clamp(0.0, MAX_CONFIDENCE) as u8
}

/// Plain distance-derived confidence without any boosts.
pub fn base_confidence(distance: f32, threshold: f32) -> u8 {
    finish(linear_score(distance, threshold))
}

/// Final confidence for an accepted candidate.
///
/// `threshold` is the base threshold of the call (not the relaxed effective
/// one), `query_faces` the size of the query set and `detector_confidence`
/// the detector score of the matched corpus face.
pub fn confidence(
    candidate: &MatchCandidate,
    query_faces: usize,
    detector_confidence: f32,
    threshold: f32,
    policy: &MatchPolicy,
) -> u8 {
    let mut score = linear_score(candidate.best_distance, threshold);

    if candidate.cosine_similarity > policy.strong_cosine {
        score = (score * policy.strong_cosine_factor).min(MAX_CONFIDENCE);
    } else if candidate.cosine_similarity > policy.moderate_cosine {
        score = (score * policy.moderate_cosine_factor).min(MAX_CONFIDENCE);
    }

    if query_faces > 1 && candidate.matching_query_faces > 1 {
        let bonus = (candidate.matching_query_faces as f32 * policy.corroboration_weight)
            .min(policy.corroboration_cap);
        score = (score + bonus).min(MAX_CONFIDENCE);
    }

    if detector_confidence > policy.detector_confidence {
        score = (score * policy.detector_confidence_factor).min(MAX_CONFIDENCE);
    }

    finish(score)
}
