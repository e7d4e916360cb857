use std::time::Duration;

use crate::{error::ConfigError, pipeline::engine::OutputSpec, types::DisplaySize};

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 10;
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1_000);

/// Number of box features that precede the class scores in every prediction.
pub const BOX_FEATURES: usize = 4;

/// Fingerspelling alphabet in training order.
pub const SIGN_ALPHABET: [&str; 26] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z",
];

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub model_input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Must match the class order the model was trained with.
    pub class_labels: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            class_labels: SIGN_ALPHABET.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.model_input_size = size;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    pub fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.class_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// Feature rows expected in the model output: box geometry plus one score
    /// per class.
    pub fn feature_count(&self) -> usize {
        BOX_FEATURES + self.num_classes()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_input_size == 0 {
            return Err(ConfigError::ZeroInputSize);
        }
        check_unit_range("confidence threshold", self.confidence_threshold)?;
        check_unit_range("iou threshold", self.iou_threshold)?;
        if self.max_detections == 0 {
            return Err(ConfigError::ZeroMaxDetections);
        }
        if self.class_labels.is_empty() {
            return Err(ConfigError::NoLabels);
        }
        Ok(())
    }

    /// Checks the engine's declared shapes against this configuration.
    ///
    /// A label list that disagrees with the model's class count would silently
    /// mislabel every detection, so it is rejected here instead.
    pub fn validate_against(&self, spec: &OutputSpec) -> Result<(), ConfigError> {
        let size = self.model_input_size as usize;
        if spec.input_dims != [1, size, size, 3] {
            return Err(ConfigError::InputShapeMismatch {
                actual: spec.input_dims.clone(),
                size: self.model_input_size,
            });
        }
        if spec.features != self.feature_count() {
            return Err(ConfigError::LabelCountMismatch {
                features: spec.features,
                labels: self.num_classes(),
                expected: self.feature_count(),
            });
        }
        Ok(())
    }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub tick_period: Duration,
    /// Overlay surface the boxes are mapped into. `None` maps into the
    /// captured frame's own size.
    pub display: Option<DisplaySize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            display: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn with_display(mut self, display: DisplaySize) -> Self {
        self.display = Some(display);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period.is_zero() {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if let Some(display) = self.display {
            if !(display.width > 0.0 && display.height > 0.0) {
                return Err(ConfigError::EmptyDisplay {
                    width: display.width,
                    height: display.height,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tensor::TensorLayout;

    fn spec(features: usize) -> OutputSpec {
        OutputSpec {
            input_dims: vec![1, 640, 640, 3],
            output_dims: vec![1, features, 8400],
            features,
            predictions: 8400,
            layout: TensorLayout::Flat,
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_classes(), 26);
        assert_eq!(config.feature_count(), 30);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let config = PipelineConfig::default().with_confidence_threshold(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));

        let config = PipelineConfig::default().with_iou_threshold(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_labels_and_zero_limits() {
        let empty: [&str; 0] = [];
        assert_eq!(
            PipelineConfig::default().with_labels(empty).validate(),
            Err(ConfigError::NoLabels)
        );
        assert_eq!(
            PipelineConfig::default().with_max_detections(0).validate(),
            Err(ConfigError::ZeroMaxDetections)
        );
        assert_eq!(
            PipelineConfig::default().with_input_size(0).validate(),
            Err(ConfigError::ZeroInputSize)
        );
    }

    #[test]
    fn label_count_must_match_model_features() {
        let config = PipelineConfig::default();
        assert!(config.validate_against(&spec(30)).is_ok());
        assert!(matches!(
            config.validate_against(&spec(9)),
            Err(ConfigError::LabelCountMismatch {
                features: 9,
                labels: 26,
                expected: 30
            })
        ));
    }

    #[test]
    fn input_shape_must_match_model_input_size() {
        let config = PipelineConfig::default().with_input_size(320);
        assert!(matches!(
            config.validate_against(&spec(30)),
            Err(ConfigError::InputShapeMismatch { size: 320, .. })
        ));
    }

    #[test]
    fn scheduler_rejects_zero_period() {
        let config = SchedulerConfig::default().with_tick_period(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickPeriod));
    }

    #[test]
    fn scheduler_rejects_degenerate_display() {
        let config = SchedulerConfig::default().with_display(DisplaySize::new(0.0, 480.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDisplay { .. })
        ));
        let config = SchedulerConfig::default().with_display(DisplaySize::new(360.0, 480.0));
        assert!(config.validate().is_ok());
    }
}
