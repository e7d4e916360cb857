//! Output tensor to candidate decoding.

use super::{
    engine::OutputSpec,
    tensor::{OutputTensor, TensorLayout},
};
use crate::{config::BOX_FEATURES, types::Candidate};

/// Read-only view over the first output tensor, resolved once per decode.
///
/// A layout/storage combination that does not line up reads as zeros, which
/// makes every prediction degenerate and yields no candidates. Features past
/// the declared count also read as zero.
enum FeatureReader<'a> {
    FeatureMajor { data: &'a [f32], predictions: usize },
    PredictionMajor { data: &'a [f32] },
    Rows(&'a [Vec<f32>]),
    Empty,
}

struct FeatureView<'a> {
    reader: FeatureReader<'a>,
    features: usize,
}

impl<'a> FeatureView<'a> {
    fn new(
        tensor: Option<&'a OutputTensor>,
        layout: TensorLayout,
        features: usize,
        predictions: usize,
    ) -> Self {
        let reader = match (layout, tensor) {
            (TensorLayout::Flat, Some(OutputTensor::Flat { data, .. })) => {
                FeatureReader::FeatureMajor { data, predictions }
            }
            (TensorLayout::Transposed, Some(OutputTensor::Flat { data, .. })) => {
                FeatureReader::PredictionMajor { data }
            }
            (TensorLayout::Nested, Some(OutputTensor::Nested(rows))) => FeatureReader::Rows(rows),
            _ => FeatureReader::Empty,
        };
        Self { reader, features }
    }

    #[inline]
    fn get(&self, feature: usize, prediction: usize) -> f32 {
        if feature >= self.features {
            return 0.0;
        }
        let value = match &self.reader {
            FeatureReader::FeatureMajor { data, predictions } => {
                data.get(feature * predictions + prediction)
            }
            FeatureReader::PredictionMajor { data } => data.get(prediction * self.features + feature),
            FeatureReader::Rows(rows) => rows.get(feature).and_then(|row| row.get(prediction)),
            FeatureReader::Empty => None,
        };
        value.copied().unwrap_or(0.0)
    }
}

/// Number of predictions to scan. Uses the declared count when the engine
/// fixed one, otherwise infers it from the buffer.
fn prediction_count(tensor: Option<&OutputTensor>, spec: &OutputSpec) -> usize {
    if spec.predictions > 0 {
        return spec.predictions;
    }
    match tensor {
        Some(OutputTensor::Flat { data, .. }) if spec.features > 0 => data.len() / spec.features,
        Some(OutputTensor::Nested(rows)) => rows.first().map(Vec::len).unwrap_or(0),
        _ => 0,
    }
}

/// Decodes every prediction into a [`Candidate`].
///
/// Features 0-3 are center x, center y, width and height; the class scores
/// follow. The best class is the first maximum. Predictions with a
/// non-positive width or height are skipped. Values are taken as-is, without
/// clamping or activation.
pub fn decode_candidates(
    outputs: &[OutputTensor],
    spec: &OutputSpec,
    num_classes: usize,
) -> Vec<Candidate> {
    if num_classes == 0 {
        return Vec::new();
    }

    let tensor = outputs.first();
    let predictions = prediction_count(tensor, spec);
    let reader = FeatureView::new(tensor, spec.layout, spec.features, predictions);

    let mut candidates = Vec::new();
    for p in 0..predictions {
        let width = reader.get(2, p);
        let height = reader.get(3, p);
        if !(width > 0.0 && height > 0.0) {
            continue;
        }

        let mut class_id = 0;
        let mut confidence = reader.get(BOX_FEATURES, p);
        for c in 1..num_classes {
            let score = reader.get(BOX_FEATURES + c, p);
            if score > confidence {
                confidence = score;
                class_id = c;
            }
        }

        candidates.push(Candidate {
            center_x: reader.get(0, p),
            center_y: reader.get(1, p),
            width,
            height,
            confidence,
            class_id,
        });
    }

    log::debug!(
        "decoded {} candidates from {} predictions",
        candidates.len(),
        predictions
    );
    candidates
}
