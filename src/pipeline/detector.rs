use std::time::Instant;

use anyhow::Result;

use super::{
    decode::decode_candidates,
    engine::{InferenceEngine, OutputSpec},
    filter::filter_by_confidence,
    mapper::{map_to_display, map_to_frame},
    nms::non_max_suppression,
    preprocess::prepare_frame,
};
use crate::{
    config::PipelineConfig,
    error::ConfigError,
    types::{Detection, DisplaySize, Frame},
};

/// One engine plus the post-processing chain around it.
pub struct Detector<E> {
    engine: E,
    config: PipelineConfig,
    spec: OutputSpec,
}

impl<E: InferenceEngine> Detector<E> {
    /// Fails when the configuration is invalid or disagrees with the
    /// engine's declared shapes.
    pub fn new(engine: E, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let spec = OutputSpec::from_engine(&engine, config.feature_count());
        config.validate_against(&spec)?;

        log::debug!(
            "detector ready: {:?} layout, {} features x {} predictions",
            spec.layout,
            spec.features,
            spec.predictions
        );

        Ok(Self {
            engine,
            config,
            spec,
        })
    }

    pub fn spec(&self) -> &OutputSpec {
        &self.spec
    }

    /// Runs one frame through the whole chain.
    ///
    /// The frame is released right after preprocessing. Boxes are mapped into
    /// `display`, or back into the frame's own pixel coordinates when no
    /// display is given.
    /// Only engine failures are returned; unreadable frames run on a neutral
    /// input instead.
    pub fn detect(&mut self, frame: Frame, display: Option<DisplaySize>) -> Result<Vec<Detection>> {
        let started = Instant::now();
        let size = self.config.model_input_size;

        let prepared = prepare_frame(&frame, size);
        drop(frame);

        let outputs = self.engine.run(&prepared.tensor)?;
        let inferred = started.elapsed();

        let candidates = decode_candidates(&outputs, &self.spec, self.config.num_classes());
        let decoded = candidates.len();
        let confident = filter_by_confidence(candidates, self.config.confidence_threshold);
        let filtered = confident.len();
        let survivors = non_max_suppression(
            confident,
            self.config.iou_threshold,
            self.config.max_detections,
        );

        let detections = match display {
            Some(display) => map_to_display(&survivors, &self.config, display),
            None if !prepared.degraded => map_to_frame(
                &survivors,
                &self.config,
                prepared.source_width,
                prepared.source_height,
            ),
            None => map_to_display(
                &survivors,
                &self.config,
                DisplaySize::new(size as f32, size as f32),
            ),
        };

        log::debug!(
            "cycle: {} decoded, {} confident, {} kept (inference {:.2?}, total {:.2?})",
            decoded,
            filtered,
            detections.len(),
            inferred,
            started.elapsed()
        );

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::pipeline::tensor::{InputTensor, OutputTensor};

    /// Returns a fixed feature-major output regardless of input.
    struct FixedEngine {
        output: Vec<f32>,
        features: usize,
        predictions: usize,
        last_input: Option<InputTensor>,
    }

    impl FixedEngine {
        fn new(rows: &[[f32; 6]]) -> Self {
            let predictions = rows.len();
            let mut output = vec![0.0; 6 * predictions];
            for (p, row) in rows.iter().enumerate() {
                for (f, value) in row.iter().enumerate() {
                    output[f * predictions + p] = *value;
                }
            }
            Self {
                output,
                features: 6,
                predictions,
                last_input: None,
            }
        }
    }

    impl InferenceEngine for FixedEngine {
        fn input_dims(&self) -> Vec<usize> {
            vec![1, 64, 64, 3]
        }

        fn output_dims(&self) -> Vec<usize> {
            vec![1, self.features, self.predictions]
        }

        fn run(&mut self, input: &InputTensor) -> anyhow::Result<Vec<OutputTensor>> {
            self.last_input = Some(input.clone());
            Ok(vec![OutputTensor::flat(
                self.output.clone(),
                self.output_dims(),
            )])
        }
    }

    struct FailingEngine;

    impl InferenceEngine for FailingEngine {
        fn input_dims(&self) -> Vec<usize> {
            vec![1, 64, 64, 3]
        }

        fn output_dims(&self) -> Vec<usize> {
            vec![1, 6, 10]
        }

        fn run(&mut self, _input: &InputTensor) -> anyhow::Result<Vec<OutputTensor>> {
            Err(anyhow!("accelerator lost"))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_input_size(64)
            .with_labels(["hello", "thanks"])
    }

    #[test]
    fn runs_full_chain() {
        let engine = FixedEngine::new(&[
            [32.0, 32.0, 16.0, 16.0, 0.9, 0.1],
            [33.0, 32.0, 16.0, 16.0, 0.2, 0.6],
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.2],
        ]);
        let mut detector = Detector::new(engine, config()).unwrap();

        let frame = Frame::rgb(vec![40; 64 * 64 * 3], 64, 64);
        let detections = detector
            .detect(frame, Some(DisplaySize::new(128.0, 128.0)))
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "hello");
        assert_abs_diff_eq!(detections[0].x, 48.0);
        assert_abs_diff_eq!(detections[0].width, 32.0);
    }

    #[test]
    fn defaults_to_frame_coordinates_through_the_crop() {
        let engine = FixedEngine::new(&[[32.0, 32.0, 16.0, 16.0, 0.1, 0.9]]);
        let mut detector = Detector::new(engine, config()).unwrap();

        // Wide frame: the model sees the central 128x128 square at half scale.
        let frame = Frame::rgb(vec![40; 256 * 128 * 3], 256, 128);
        let detections = detector.detect(frame, None).unwrap();

        assert_eq!(detections[0].label, "thanks");
        assert_abs_diff_eq!(detections[0].x, 112.0);
        assert_abs_diff_eq!(detections[0].y, 48.0);
        assert_abs_diff_eq!(detections[0].width, 32.0);
        assert_abs_diff_eq!(detections[0].height, 32.0);
    }

    #[test]
    fn frame_coordinates_follow_the_object() {
        // A blue stripe at x in [48, 80) of a 128x64 frame; the engine reports
        // the stripe's extent in model space.
        struct StripeEngine;

        impl InferenceEngine for StripeEngine {
            fn input_dims(&self) -> Vec<usize> {
                vec![1, 64, 64, 3]
            }

            fn output_dims(&self) -> Vec<usize> {
                vec![1, 5, 1]
            }

            fn run(&mut self, input: &InputTensor) -> anyhow::Result<Vec<OutputTensor>> {
                let blue: Vec<u32> = (0..64)
                    .filter(|&x| input.pixel(x, 32).is_some_and(|p| p[2] > 128 && p[0] < 128))
                    .collect();
                let (x0, x1) = (blue[0] as f32, (blue[blue.len() - 1] + 1) as f32);
                Ok(vec![OutputTensor::flat(
                    vec![(x0 + x1) / 2.0, 32.0, x1 - x0, 64.0, 0.9],
                    self.output_dims(),
                )])
            }
        }

        let mut rgb = Vec::with_capacity(128 * 64 * 3);
        for _ in 0..64 {
            for x in 0..128 {
                if (48..80).contains(&x) {
                    rgb.extend_from_slice(&[0, 0, 255]);
                } else {
                    rgb.extend_from_slice(&[255, 255, 255]);
                }
            }
        }

        let config = PipelineConfig::default()
            .with_input_size(64)
            .with_labels(["stripe"]);
        let mut detector = Detector::new(StripeEngine, config).unwrap();
        let detections = detector.detect(Frame::rgb(rgb, 128, 64), None).unwrap();

        assert_abs_diff_eq!(detections[0].x, 48.0, epsilon = 1.0);
        assert_abs_diff_eq!(detections[0].width, 32.0, epsilon = 2.0);
    }

    #[test]
    fn corrupt_frame_still_reaches_engine() {
        let engine = FixedEngine::new(&[[32.0, 32.0, 16.0, 16.0, 0.1, 0.9]]);
        let mut detector = Detector::new(engine, config()).unwrap();

        let detections = detector.detect(Frame::encoded(vec![1, 2, 3]), None).unwrap();
        assert_eq!(detections.len(), 1);

        let input = detector.engine.last_input.as_ref().unwrap();
        assert!(input.as_slice().iter().all(|&v| v == 128));
    }

    #[test]
    fn engine_failure_is_returned() {
        let mut detector = Detector::new(FailingEngine, config()).unwrap();
        let frame = Frame::rgb(vec![0; 64 * 64 * 3], 64, 64);
        assert!(detector.detect(frame, None).is_err());
    }

    #[test]
    fn label_mismatch_is_rejected() {
        let engine = FixedEngine::new(&[[32.0, 32.0, 16.0, 16.0, 0.1, 0.9]]);
        let config = config().with_labels(["a", "b", "c"]);
        assert!(matches!(
            Detector::new(engine, config),
            Err(ConfigError::LabelCountMismatch { .. })
        ));
    }
}
