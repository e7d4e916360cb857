//! Greedy class-agnostic non-maximum suppression.

use crate::types::Candidate;

/// Intersection over union of two center-based boxes.
///
/// Zero when the union is empty. Clamped to 1 to absorb rounding.
pub fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let [ax0, ay0, ax1, ay1] = a.corners();
    let [bx0, by0, bx1, by1] = b.corners();

    let inter_w = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
    let inter_h = (ay1.min(by1) - ay0.max(by0)).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (ax1 - ax0) * (ay1 - ay0);
    let area_b = (bx1 - bx0) * (by1 - by0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        (intersection / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Returns at most `max_detections` candidates in descending confidence.
///
/// The sort is stable, so equal confidences keep their input order. Each
/// pick removes every remaining candidate whose IoU with it exceeds
/// `iou_threshold`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if kept.len() >= max_detections {
            break;
        }
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && iou(&candidates[i], &candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept
}
