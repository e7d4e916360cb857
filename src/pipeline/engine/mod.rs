#[cfg(feature = "backend-ort")]
mod ort;

#[cfg(feature = "backend-ort")]
pub use self::ort::OrtEngine;

use super::tensor::{InputTensor, OutputTensor, TensorLayout};

/// Opaque inference capability. Only the declared shape contract is relied on.
pub trait InferenceEngine: Send + 'static {
    /// Declared input dimensions, expected to be `[1, S, S, 3]`.
    fn input_dims(&self) -> Vec<usize>;

    /// Declared dimensions of the first output, `[1, F, P]` or `[1, P, F]`.
    fn output_dims(&self) -> Vec<usize>;

    /// Engines that hand back per-feature rows instead of one flat buffer
    /// override this.
    fn nested_output(&self) -> bool {
        false
    }

    fn run(&mut self, input: &InputTensor) -> anyhow::Result<Vec<OutputTensor>>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn input_dims(&self) -> Vec<usize> {
        (**self).input_dims()
    }

    fn output_dims(&self) -> Vec<usize> {
        (**self).output_dims()
    }

    fn nested_output(&self) -> bool {
        (**self).nested_output()
    }

    fn run(&mut self, input: &InputTensor) -> anyhow::Result<Vec<OutputTensor>> {
        (**self).run(input)
    }
}

/// Shape contract of a loaded engine, fixed for its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    pub input_dims: Vec<usize>,
    pub output_dims: Vec<usize>,
    pub features: usize,
    /// Zero when the engine leaves the prediction axis symbolic.
    pub predictions: usize,
    pub layout: TensorLayout,
}

impl OutputSpec {
    pub fn from_engine<E: InferenceEngine + ?Sized>(engine: &E, expected_features: usize) -> Self {
        let input_dims = engine.input_dims();
        let output_dims = engine.output_dims();
        let (layout, features, predictions) =
            TensorLayout::resolve(&output_dims, expected_features, engine.nested_output());

        Self {
            input_dims,
            output_dims,
            features,
            predictions,
            layout,
        }
    }
}
