use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("model input size must be positive")]
    ZeroInputSize,
    #[error("{name} must lie in [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("max detections must be positive")]
    ZeroMaxDetections,
    #[error("class label list is empty")]
    NoLabels,
    #[error("tick period must be non-zero")]
    ZeroTickPeriod,
    #[error("display size must be positive, got {width}x{height}")]
    EmptyDisplay { width: f32, height: f32 },
    #[error(
        "model declares {features} output features but {labels} labels were configured (expected {expected})"
    )]
    LabelCountMismatch {
        features: usize,
        labels: usize,
        expected: usize,
    },
    #[error("model input shape {actual:?} does not match [1, {size}, {size}, 3]")]
    InputShapeMismatch { actual: Vec<usize>, size: u32 },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no frame available: {0}")]
    Unavailable(String),
    #[error("camera backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("camera permission denied; detection will not start")]
    PermissionDenied,
    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to load detection model: {0}")]
    ModelLoad(String),
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str, #[source] std::io::Error),
}
