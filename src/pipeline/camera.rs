use std::path::PathBuf;

use anyhow::Context;

use crate::{error::CameraError, types::Frame};

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraDevice, NokhwaCamera, available_cameras};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Frame source driven by the capture scheduler.
pub trait Camera: Send + 'static {
    /// Asked once before the scheduler starts.
    fn request_permission(&mut self) -> PermissionStatus;

    /// Called once per accepted tick.
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;
}

enum StillSource {
    Files(Vec<PathBuf>),
    Frames(Vec<Frame>),
}

/// Replays still captures in a loop.
///
/// Files are read on every capture and handed on still encoded, so decoding
/// happens in preprocessing like any other still capture.
pub struct StillCamera {
    source: StillSource,
    next: usize,
    permission: PermissionStatus,
}

impl StillCamera {
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            source: StillSource::Files(paths),
            next: 0,
            permission: PermissionStatus::Granted,
        }
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            source: StillSource::Frames(frames),
            next: 0,
            permission: PermissionStatus::Granted,
        }
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

    fn len(&self) -> usize {
        match &self.source {
            StillSource::Files(paths) => paths.len(),
            StillSource::Frames(frames) => frames.len(),
        }
    }
}

impl Camera for StillCamera {
    fn request_permission(&mut self) -> PermissionStatus {
        self.permission
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.permission == PermissionStatus::Denied {
            return Err(CameraError::PermissionDenied);
        }
        let len = self.len();
        if len == 0 {
            return Err(CameraError::Unavailable("no still captures configured".into()));
        }
        let idx = self.next % len;
        self.next = self.next.wrapping_add(1);

        match &self.source {
            StillSource::Files(paths) => {
                let path = &paths[idx];
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read still capture {}", path.display()))?;
                Ok(Frame::encoded(bytes))
            }
            StillSource::Frames(frames) => {
                let mut frame = frames[idx].clone();
                frame.timestamp = std::time::Instant::now();
                Ok(frame)
            }
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Duration,
    };

    use anyhow::{Result, anyhow};
    use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
    use nokhwa::{
        Camera as NativeCamera, nokhwa_check, nokhwa_initialize,
        pixel_format::RgbFormat,
        query,
        utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::{Camera, PermissionStatus};
    use crate::{
        error::CameraError,
        types::{Frame, FramePixels},
    };

    const FRAME_TIMEOUT: Duration = Duration::from_millis(500);
    const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
    const PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);

    // Formats preprocessing converts itself, so the capture thread never
    // decodes frames the scheduler is going to skip.
    const PASSTHROUGH_FORMATS: &[FrameFormat] =
        &[FrameFormat::NV12, FrameFormat::MJPEG, FrameFormat::RAWRGB];

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub name: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        Ok(query(ApiBackend::Auto)?
            .into_iter()
            .map(|info| CameraDevice {
                index: info.index().clone(),
                name: info.human_name(),
            })
            .collect())
    }

    fn open_device(index: &CameraIndex) -> Result<NativeCamera> {
        let passthrough = RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PASSTHROUGH_FORMATS,
        );
        let decoded = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);

        let mut last_err = anyhow!("camera {index} offers no usable format");
        for requested in [passthrough, decoded] {
            let opened = NativeCamera::new(index.clone(), requested).and_then(|mut camera| {
                camera.open_stream()?;
                Ok(camera)
            });
            match opened {
                Ok(camera) => {
                    log::info!(
                        "camera {index} streaming {} at {}",
                        camera.frame_format(),
                        camera.resolution()
                    );
                    return Ok(camera);
                }
                Err(err) => last_err = err.into(),
            }
        }
        Err(last_err)
    }

    /// Wraps a raw buffer without decoding it. `None` for formats
    /// preprocessing does not understand.
    pub(super) fn passthrough_frame(
        format: FrameFormat,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Option<Frame> {
        let pixels = match format {
            FrameFormat::MJPEG => FramePixels::Encoded(bytes.to_vec()),
            FrameFormat::RAWRGB => FramePixels::Rgb8(bytes.to_vec()),
            FrameFormat::NV12 => {
                let luma = (width as usize) * (height as usize);
                if bytes.len() < luma {
                    return None;
                }
                let (y, uv) = bytes.split_at(luma);
                FramePixels::Nv12 {
                    y: y.to_vec(),
                    uv: uv.to_vec(),
                }
            }
            _ => return None,
        };
        let (width, height) = match pixels {
            // Encoded dimensions come from the decoder.
            FramePixels::Encoded(_) => (0, 0),
            _ => (width, height),
        };
        Some(Frame::new(pixels, width, height))
    }

    /// Capture loop on its own thread. Only the newest frame is kept.
    struct CaptureThread {
        running: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
        frames: Receiver<Frame>,
    }

    impl CaptureThread {
        fn start(index: CameraIndex) -> Result<Self, CameraError> {
            let running = Arc::new(AtomicBool::new(true));
            let (frame_tx, frames) = crossbeam_channel::bounded(1);
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

            let flag = running.clone();
            let handle = thread::Builder::new()
                .name("camera-capture".into())
                .spawn(move || capture_loop(index, flag, ready_tx, frame_tx))
                .map_err(|err| CameraError::Backend(err.into()))?;

            let capture = Self {
                running,
                handle: Some(handle),
                frames,
            };
            match ready_rx.recv_timeout(OPEN_TIMEOUT) {
                Ok(Ok(())) => Ok(capture),
                Ok(Err(reason)) => Err(CameraError::Unavailable(reason)),
                Err(_) => Err(CameraError::Unavailable("camera did not open in time".into())),
            }
        }
    }

    impl Drop for CaptureThread {
        fn drop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn capture_loop(
        index: CameraIndex,
        running: Arc<AtomicBool>,
        ready: Sender<Result<(), String>>,
        frames: Sender<Frame>,
    ) {
        // The device handle is not `Send`; it lives and dies on this thread.
        let mut camera = match open_device(&index) {
            Ok(camera) => {
                let _ = ready.send(Ok(()));
                camera
            }
            Err(err) => {
                log::error!("failed to open camera {index}: {err:?}");
                let _ = ready.send(Err(format!("{err:#}")));
                return;
            }
        };

        while running.load(Ordering::Relaxed) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera read failed: {err}");
                    continue;
                }
            };
            let resolution = buffer.resolution();
            let frame = match passthrough_frame(
                buffer.source_frame_format(),
                resolution.width(),
                resolution.height(),
                buffer.buffer(),
            ) {
                Some(frame) => frame,
                None => match buffer.decode_image::<RgbFormat>() {
                    Ok(image) => {
                        let (width, height) = image.dimensions();
                        Frame::rgb(image.into_raw(), width, height)
                    }
                    Err(err) => {
                        log::warn!("failed to decode camera frame: {err}");
                        continue;
                    }
                },
            };
            let _ = frames.try_send(frame);
        }
        let _ = camera.stop_stream();
    }

    /// Live device camera. The device is opened on the first capture, after
    /// access has been granted.
    pub struct NokhwaCamera {
        index: CameraIndex,
        granted: bool,
        capture: Option<CaptureThread>,
    }

    impl NokhwaCamera {
        pub fn new(index: CameraIndex) -> Self {
            Self {
                index,
                granted: false,
                capture: None,
            }
        }
    }

    impl Camera for NokhwaCamera {
        fn request_permission(&mut self) -> PermissionStatus {
            if !nokhwa_check() {
                let (tx, rx) = crossbeam_channel::bounded(1);
                nokhwa_initialize(move |granted| {
                    let _ = tx.try_send(granted);
                });
                self.granted = rx.recv_timeout(PERMISSION_TIMEOUT).unwrap_or(false);
            } else {
                self.granted = true;
            }

            if self.granted {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            }
        }

        fn capture_frame(&mut self) -> Result<Frame, CameraError> {
            if !self.granted {
                return Err(CameraError::PermissionDenied);
            }
            if self.capture.is_none() {
                self.capture = Some(CaptureThread::start(self.index.clone())?);
            }
            let Some(capture) = self.capture.as_ref() else {
                return Err(CameraError::Unavailable("camera not started".into()));
            };

            let mut frame = match capture.frames.recv_timeout(FRAME_TIMEOUT) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CameraError::Unavailable("camera produced no frame".into()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Reopened on the next capture.
                    self.capture = None;
                    return Err(CameraError::Unavailable("camera stream stopped".into()));
                }
            };
            while let Ok(newer) = capture.frames.try_recv() {
                frame = newer;
            }
            Ok(frame)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn nv12_buffer_is_split_into_planes() {
            let bytes: Vec<u8> = (0..24).collect();
            let frame = passthrough_frame(FrameFormat::NV12, 4, 4, &bytes).unwrap();

            assert_eq!((frame.width, frame.height), (4, 4));
            match frame.pixels {
                FramePixels::Nv12 { y, uv } => {
                    assert_eq!(y.len(), 16);
                    assert_eq!(uv, (16..24).collect::<Vec<u8>>());
                }
                other => panic!("unexpected pixels {other:?}"),
            }
        }

        #[test]
        fn mjpeg_is_left_encoded() {
            let frame = passthrough_frame(FrameFormat::MJPEG, 640, 480, &[0xff, 0xd8]).unwrap();
            assert!(matches!(frame.pixels, FramePixels::Encoded(_)));
            assert_eq!((frame.width, frame.height), (0, 0));
        }

        #[test]
        fn other_formats_need_decoding() {
            assert!(passthrough_frame(FrameFormat::YUYV, 2, 2, &[0; 8]).is_none());
            assert!(passthrough_frame(FrameFormat::NV12, 4, 4, &[0; 8]).is_none());
        }
    }
}
