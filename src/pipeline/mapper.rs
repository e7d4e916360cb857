//! Model space to display space mapping.

use super::preprocess::cover_crop;
use crate::{
    config::PipelineConfig,
    types::{Candidate, Detection, DisplaySize},
};

pub fn label_for(labels: &[String], class_id: usize) -> String {
    labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("Class{class_id}"))
}

/// Converts a center-based model-space candidate into a top-left display
/// box. Corners are clamped to `[0, input_size]` before scaling.
pub fn to_display(
    candidate: &Candidate,
    input_size: u32,
    display: DisplaySize,
    labels: &[String],
) -> Detection {
    let size = input_size as f32;
    let [x0, y0, x1, y1] = candidate.corners();
    let (x0, x1) = (x0.clamp(0.0, size), x1.clamp(0.0, size));
    let (y0, y1) = (y0.clamp(0.0, size), y1.clamp(0.0, size));

    let scale_x = display.width / size;
    let scale_y = display.height / size;

    Detection {
        x: x0 * scale_x,
        y: y0 * scale_y,
        width: (x1 - x0) * scale_x,
        height: (y1 - y0) * scale_y,
        confidence: candidate.confidence,
        class_id: candidate.class_id,
        label: label_for(labels, candidate.class_id),
    }
}

pub fn map_to_display(
    candidates: &[Candidate],
    config: &PipelineConfig,
    display: DisplaySize,
) -> Vec<Detection> {
    candidates
        .iter()
        .map(|c| to_display(c, config.model_input_size, display, &config.class_labels))
        .collect()
}

/// Maps candidates back into the coordinates of the `width x height` frame
/// they were cropped from.
///
/// The model only saw the central square of the frame, so boxes are scaled
/// onto that square and shifted by its offset.
pub fn map_to_frame(
    candidates: &[Candidate],
    config: &PipelineConfig,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    let (left, top, side, _) = cover_crop(width, height);
    let square = DisplaySize::new(side as f32, side as f32);
    candidates
        .iter()
        .map(|c| {
            let mut det = to_display(c, config.model_input_size, square, &config.class_labels);
            det.x += left as f32;
            det.y += top as f32;
            det
        })
        .collect()
}

/// Inverse scale of [`to_display`]: returns the model-space
/// `[x, y, width, height]` (top-left based) of a display detection.
pub fn to_model_space(detection: &Detection, input_size: u32, display: DisplaySize) -> [f32; 4] {
    let size = input_size as f32;
    let scale_x = size / display.width;
    let scale_y = size / display.height;
    [
        detection.x * scale_x,
        detection.y * scale_y,
        detection.width * scale_x,
        detection.height * scale_y,
    ]
}
