//! Frame to model-input conversion.
//!
//! Frames are scaled to cover the square model input and the overflow is
//! cropped evenly from both sides, so the tensor always shows the central
//! square of the frame. Channel order stays RGB and intensities stay raw
//! 0-255; no normalisation is applied.

use std::borrow::Cow;

use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fr;
use rayon::prelude::*;
use yuv::{YuvBiPlanarImage, YuvConversionMode, YuvRange, YuvStandardMatrix};

use super::tensor::{InputTensor, RGB_CHANNELS};
use crate::types::{Frame, FramePixels};

pub const NEUTRAL_GRAY: u8 = 128;

#[derive(Clone, Debug)]
pub struct PreparedInput {
    pub tensor: InputTensor,
    /// Dimensions of the decoded source, zero when decoding failed.
    pub source_width: u32,
    pub source_height: u32,
    pub degraded: bool,
}

/// Converts `frame` into a `size x size` RGB tensor.
///
/// Never fails: an unreadable frame yields a mid-gray tensor and
/// `degraded = true` so one corrupt frame cannot halt the pipeline.
pub fn prepare_frame(frame: &Frame, size: u32) -> PreparedInput {
    match rgb_pixels(frame).and_then(|(rgb, w, h)| {
        let tensor = resize_cover(&rgb, w, h, size)?;
        Ok((tensor, w, h))
    }) {
        Ok((tensor, source_width, source_height)) => PreparedInput {
            tensor,
            source_width,
            source_height,
            degraded: false,
        },
        Err(err) => {
            log::warn!("frame preprocessing failed, substituting neutral input: {err:?}");
            PreparedInput {
                tensor: neutral_tensor(size),
                source_width: 0,
                source_height: 0,
                degraded: true,
            }
        }
    }
}

pub fn neutral_tensor(size: u32) -> InputTensor {
    InputTensor::filled(size, [NEUTRAL_GRAY; 3])
}

fn rgb_pixels(frame: &Frame) -> Result<(Cow<'_, [u8]>, u32, u32)> {
    let (width, height) = (frame.width, frame.height);
    let pixel_count = (width as usize) * (height as usize);

    match &frame.pixels {
        FramePixels::Rgb8(rgb) => {
            ensure!(pixel_count > 0, "empty {width}x{height} frame");
            ensure!(
                rgb.len() == pixel_count * RGB_CHANNELS,
                "rgb buffer holds {} bytes, expected {}",
                rgb.len(),
                pixel_count * RGB_CHANNELS
            );
            Ok((Cow::Borrowed(rgb.as_slice()), width, height))
        }
        FramePixels::Rgba8(rgba) => {
            ensure!(pixel_count > 0, "empty {width}x{height} frame");
            ensure!(
                rgba.len() == pixel_count * 4,
                "rgba buffer holds {} bytes, expected {}",
                rgba.len(),
                pixel_count * 4
            );
            Ok((Cow::Owned(rgba_to_rgb(rgba)), width, height))
        }
        FramePixels::Nv12 { y, uv } => {
            ensure!(pixel_count > 0, "empty {width}x{height} frame");
            Ok((Cow::Owned(nv12_to_rgb(y, uv, width, height)?), width, height))
        }
        FramePixels::Encoded(bytes) => {
            let decoded = image::load_from_memory(bytes)
                .context("failed to decode still capture")?
                .to_rgb8();
            let (w, h) = decoded.dimensions();
            ensure!(w > 0 && h > 0, "decoded image is empty");
            Ok((Cow::Owned(decoded.into_raw()), w, h))
        }
    }
}

fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let pixel_count = rgba.len() / 4;
    let mut rgb = vec![0u8; pixel_count * RGB_CHANNELS];
    rgb.par_chunks_exact_mut(RGB_CHANNELS)
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(dst, src)| dst.copy_from_slice(&src[..RGB_CHANNELS]));
    rgb
}

fn nv12_to_rgb(y: &[u8], uv: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let uv_stride = width.div_ceil(2) * 2;
    let y_len = (width as usize) * (height as usize);
    let uv_len = (uv_stride as usize) * (height.div_ceil(2) as usize);
    ensure!(
        y.len() >= y_len,
        "luma plane holds {} bytes, expected {y_len}",
        y.len()
    );
    ensure!(
        uv.len() >= uv_len,
        "chroma plane holds {} bytes, expected {uv_len}",
        uv.len()
    );

    let planar = YuvBiPlanarImage {
        y_plane: y,
        y_stride: width,
        uv_plane: uv,
        uv_stride,
        width,
        height,
    };
    let mut rgb = vec![0u8; y_len * RGB_CHANNELS];
    yuv::yuv_nv12_to_rgb(
        &planar,
        &mut rgb,
        width * RGB_CHANNELS as u32,
        YuvRange::Limited,
        YuvStandardMatrix::Bt601,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("nv12 conversion failed: {err:?}"))?;
    Ok(rgb)
}

/// Source rectangle `(left, top, width, height)` that fills a square target.
pub fn cover_crop(width: u32, height: u32) -> (f64, f64, f64, f64) {
    let side = width.min(height) as f64;
    let left = (width as f64 - side) / 2.0;
    let top = (height as f64 - side) / 2.0;
    (left, top, side, side)
}

fn resize_cover(rgb: &[u8], width: u32, height: u32, size: u32) -> Result<InputTensor> {
    ensure!(size > 0, "model input size is zero");

    let src = fr::images::ImageRef::new(width, height, rgb, fr::PixelType::U8x3)
        .context("failed to wrap source frame")?;
    let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);

    let (left, top, crop_w, crop_h) = cover_crop(width, height);
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear))
        .crop(left, top, crop_w, crop_h);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(&src, &mut dst, Some(&options))
        .context("failed to resize frame to model input")?;

    InputTensor::from_rgb(size, dst.buffer().to_vec())
        .ok_or_else(|| anyhow!("resized buffer does not match {size}x{size}x3"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        rgb.iter()
            .copied()
            .cycle()
            .take((width * height) as usize * 3)
            .collect()
    }

    #[test]
    fn crop_takes_central_square() {
        assert_eq!(cover_crop(640, 480), (80.0, 0.0, 480.0, 480.0));
        assert_eq!(cover_crop(480, 640), (0.0, 80.0, 480.0, 480.0));
        assert_eq!(cover_crop(32, 32), (0.0, 0.0, 32.0, 32.0));
    }

    #[test]
    fn rgb_frame_resizes_to_model_size() {
        let frame = Frame::rgb(solid_rgb(64, 48, [200, 10, 30]), 64, 48);
        let prepared = prepare_frame(&frame, 16);

        assert!(!prepared.degraded);
        assert_eq!((prepared.source_width, prepared.source_height), (64, 48));
        assert_eq!(prepared.tensor.dims(), [1, 16, 16, 3]);
        assert_eq!(prepared.tensor.pixel(8, 8), Some([200, 10, 30]));
    }

    #[test]
    fn crop_discards_frame_edges() {
        // Left and right quarters are red, the centre is blue.
        let (width, height) = (40u32, 20u32);
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..height {
            for x in 0..width {
                if (10..30).contains(&x) {
                    rgb.extend_from_slice(&[0, 0, 255]);
                } else {
                    rgb.extend_from_slice(&[255, 0, 0]);
                }
            }
        }
        let prepared = prepare_frame(&Frame::rgb(rgb, width, height), 8);

        assert!(!prepared.degraded);
        // Outer columns may blend with pixels just outside the crop.
        for y in 0..8 {
            for x in 2..6 {
                assert_eq!(prepared.tensor.pixel(x, y), Some([0, 0, 255]));
            }
        }
    }

    #[test]
    fn rgba_alpha_is_dropped() {
        let rgba: Vec<u8> = [10u8, 20, 30, 0]
            .iter()
            .copied()
            .cycle()
            .take(8 * 8 * 4)
            .collect();
        let prepared = prepare_frame(&Frame::rgba(rgba, 8, 8), 8);

        assert!(!prepared.degraded);
        assert_eq!(prepared.tensor.pixel(0, 0), Some([10, 20, 30]));
    }

    #[test]
    fn encoded_png_is_decoded() {
        let image = image::RgbImage::from_pixel(12, 12, image::Rgb([5, 100, 250]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let prepared = prepare_frame(&Frame::encoded(bytes), 6);

        assert!(!prepared.degraded);
        assert_eq!((prepared.source_width, prepared.source_height), (12, 12));
        assert_eq!(prepared.tensor.pixel(3, 3), Some([5, 100, 250]));
    }

    #[test]
    fn corrupt_frame_falls_back_to_gray() {
        let prepared = prepare_frame(&Frame::encoded(vec![0xde, 0xad, 0xbe, 0xef]), 4);
        assert!(prepared.degraded);
        assert_eq!(prepared.tensor, neutral_tensor(4));
    }

    #[test]
    fn short_buffer_falls_back_to_gray() {
        let prepared = prepare_frame(&Frame::rgb(vec![1, 2, 3], 4, 4), 4);
        assert!(prepared.degraded);
        assert!(prepared.tensor.as_slice().iter().all(|&v| v == NEUTRAL_GRAY));
    }

    #[test]
    fn truncated_nv12_falls_back_to_gray() {
        let frame = Frame::new(
            FramePixels::Nv12 {
                y: vec![16; 16],
                uv: vec![128; 2],
            },
            4,
            4,
        );
        let prepared = prepare_frame(&frame, 4);
        assert!(prepared.degraded);
    }

    #[test]
    fn nv12_converts_with_bt601_limited_range() {
        // Y=81, U=90, V=240 is pure red in limited-range BT.601.
        let frame = Frame::new(
            FramePixels::Nv12 {
                y: vec![81; 16],
                uv: [90u8, 240].iter().copied().cycle().take(8).collect(),
            },
            4,
            4,
        );
        let prepared = prepare_frame(&frame, 4);

        assert!(!prepared.degraded);
        assert_eq!((prepared.source_width, prepared.source_height), (4, 4));
        assert_eq!(prepared.tensor.pixel(1, 1), Some([255, 0, 0]));
    }
}
