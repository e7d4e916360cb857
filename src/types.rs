use std::time::Instant;

/// Raw pixel payload of a captured frame.
#[derive(Clone, Debug)]
pub enum FramePixels {
    /// Packed 8-bit RGB, `width * height * 3` bytes.
    Rgb8(Vec<u8>),
    /// Packed 8-bit RGBA, `width * height * 4` bytes. Alpha is ignored.
    Rgba8(Vec<u8>),
    /// Bi-planar YUV 4:2:0 as delivered by most mobile sensors.
    Nv12 { y: Vec<u8>, uv: Vec<u8> },
    /// Compressed still capture (JPEG or PNG).
    Encoded(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: FramePixels,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn rgb(rgb: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(FramePixels::Rgb8(rgb), width, height)
    }

    pub fn rgba(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(FramePixels::Rgba8(rgba), width, height)
    }

    /// Dimensions of an encoded frame are only known after decoding, so they
    /// start out as zero.
    pub fn encoded(bytes: Vec<u8>) -> Self {
        Self::new(FramePixels::Encoded(bytes), 0, 0)
    }

    pub fn new(pixels: FramePixels, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// A provisional detection in model space, center based.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Candidate {
    /// Axis-aligned corners as `[x_min, y_min, x_max, y_max]`.
    pub fn corners(&self) -> [f32; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        [
            self.center_x - half_w,
            self.center_y - half_h,
            self.center_x + half_w,
            self.center_y + half_h,
        ]
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Terminal pipeline output in display space, top-left based.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn display_text(&self) -> String {
        format!("{} ({:.0}%)", self.label, self.confidence * 100.0)
    }
}

/// Size of the surface the overlay consumer draws on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}
