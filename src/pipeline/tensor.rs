//! Tensors exchanged with the inference engine.

pub const RGB_CHANNELS: usize = 3;

/// `[1, S, S, 3]` unsigned-byte model input, row-major RGB.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    data: Vec<u8>,
    size: u32,
}

impl InputTensor {
    /// Returns `None` when `data` is not exactly `size * size * 3` bytes.
    pub fn from_rgb(size: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != Self::byte_len(size) {
            return None;
        }
        Some(Self { data, size })
    }

    pub fn filled(size: u32, rgb: [u8; 3]) -> Self {
        let pixels = (size as usize) * (size as usize);
        let mut data = Vec::with_capacity(pixels * RGB_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self { data, size }
    }

    pub fn byte_len(size: u32) -> usize {
        (size as usize) * (size as usize) * RGB_CHANNELS
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn dims(&self) -> [usize; 4] {
        let s = self.size as usize;
        [1, s, s, RGB_CHANNELS]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let idx = ((y as usize) * (self.size as usize) + x as usize) * RGB_CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// Raw output as handed back by an engine.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputTensor {
    /// One contiguous buffer plus its dimensions.
    Flat { data: Vec<f32>, dims: Vec<usize> },
    /// Per-feature rows, `rows[feature][prediction]`.
    Nested(Vec<Vec<f32>>),
}

impl OutputTensor {
    pub fn flat(data: Vec<f32>, dims: Vec<usize>) -> Self {
        OutputTensor::Flat { data, dims }
    }
}

/// How the decoder addresses `(feature, prediction)` in an output tensor.
///
/// Resolved once when the model is loaded, from its declared output shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// Feature-major flat buffer, `data[feature * P + prediction]`.
    Flat,
    /// Nested rows, `rows[feature][prediction]`.
    Nested,
    /// Prediction-major flat buffer, `data[prediction * F + feature]`.
    Transposed,
}

impl TensorLayout {
    /// Picks the layout and `(features, predictions)` for a declared output
    /// shape, given the feature count the configuration expects.
    ///
    /// `[1, F, P]` and `[F, P]` are feature-major. `[1, P, F]` is transposed
    /// when only the last axis matches. Anything else falls back to
    /// feature-major on the second-to-last axis so config validation can
    /// report the mismatch.
    pub fn resolve(dims: &[usize], expected_features: usize, nested: bool) -> (Self, usize, usize) {
        let (a, b) = match dims {
            [1, a, b] | [a, b] => (*a, *b),
            [.., a, b] => (*a, *b),
            [n] => (*n, 0),
            [] => (0, 0),
        };

        if nested {
            return (TensorLayout::Nested, a, b);
        }
        if a != expected_features && b == expected_features {
            (TensorLayout::Transposed, b, a)
        } else {
            (TensorLayout::Flat, a, b)
        }
    }
}
