//! Sign gesture detection over a periodically sampled camera.
//!
//! A [`DetectionService`] samples frames on a fixed timer, runs each one
//! through preprocessing, an [`InferenceEngine`], candidate decoding,
//! confidence filtering and non-maximum suppression, and publishes the
//! resulting [`Detection`]s in display coordinates. At most one cycle is in
//! flight; ticks that arrive while busy are dropped.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod types;

pub use config::{PipelineConfig, SchedulerConfig};
pub use error::{CameraError, ConfigError, PipelineError};
pub use pipeline::{
    Camera, DetectionFeed, DetectionSnapshot, Detector, InferenceEngine, ModelState,
    PermissionStatus, StillCamera,
};
pub use service::DetectionService;
pub use types::{Candidate, Detection, DisplaySize, Frame, FramePixels};
