use crate::types::Candidate;

/// Keeps candidates whose confidence is at least `threshold`, in order.
pub fn filter_by_confidence(candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .collect()
}
