pub mod camera;
pub mod decode;
pub mod detector;
pub mod engine;
pub mod feed;
pub mod filter;
pub mod lifecycle;
pub mod mapper;
pub mod nms;
pub mod preprocess;
pub mod scheduler;
pub mod tensor;
pub mod worker;

pub use self::{
    camera::{Camera, PermissionStatus, StillCamera},
    detector::Detector,
    engine::{InferenceEngine, OutputSpec},
    feed::{DetectionFeed, DetectionSnapshot, recv_latest},
    lifecycle::{ModelLifecycle, ModelState},
    scheduler::{
        CaptureScheduler, CycleJob, SchedulerHandle, SchedulerPhase, SchedulerStats, TickOutcome,
    },
    tensor::{InputTensor, OutputTensor, TensorLayout},
    worker::start_worker,
};

#[cfg(feature = "camera-nokhwa")]
pub use self::camera::{CameraDevice, NokhwaCamera, available_cameras};
#[cfg(feature = "backend-ort")]
pub use self::engine::OrtEngine;
