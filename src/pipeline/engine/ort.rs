use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{Tensor, ValueType};

use super::InferenceEngine;
use crate::pipeline::tensor::{InputTensor, OutputTensor};

/// ONNX Runtime backed detector session.
pub struct OrtEngine {
    session: Session,
    input_dims: Vec<usize>,
    output_dims: Vec<usize>,
}

impl OrtEngine {
    /// Loads `model_path`. Symbolic input axes are pinned to batch 1 and
    /// `input_size`; a symbolic prediction axis in the output is left as 0.
    pub fn new(model_path: &Path, input_size: u32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("model declares no inputs"))?;
        let input_dims = tensor_dims(&input.input_type)
            .map(|dims| pin_input_dims(&dims, input_size))
            .ok_or_else(|| anyhow!("model input `{}` is not a tensor", input.name))?;

        let output = session
            .outputs
            .first()
            .ok_or_else(|| anyhow!("model declares no outputs"))?;
        let output_dims = tensor_dims(&output.output_type)
            .map(|dims| pin_output_dims(&dims))
            .ok_or_else(|| anyhow!("model output `{}` is not a tensor", output.name))?;

        log::debug!(
            "ORT session ready: input {:?}, output {:?}",
            input_dims,
            output_dims
        );

        Ok(Self {
            session,
            input_dims,
            output_dims,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn input_dims(&self) -> Vec<usize> {
        self.input_dims.clone()
    }

    fn output_dims(&self) -> Vec<usize> {
        self.output_dims.clone()
    }

    fn run(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>> {
        let [batch, height, width, channels] = input.dims();
        let array = Array4::from_shape_vec(
            (batch, height, width, channels),
            input.as_slice().to_vec(),
        )
        .context("failed to shape input tensor")?;
        let tensor = Tensor::from_array(array)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() == 0 {
            return Err(anyhow!("model returned no outputs"));
        }

        let mut tensors = Vec::with_capacity(outputs.len());
        for idx in 0..outputs.len() {
            let values = outputs[idx].try_extract_array::<f32>()?;
            let dims = values.shape().to_vec();
            tensors.push(OutputTensor::flat(values.iter().copied().collect(), dims));
        }
        Ok(tensors)
    }
}

fn tensor_dims(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

fn pin_input_dims(dims: &[i64], input_size: u32) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .map(|(axis, &dim)| match (axis, dim) {
            (_, d) if d > 0 => d as usize,
            (0, _) => 1,
            (3, _) => 3,
            _ => input_size as usize,
        })
        .collect()
}

fn pin_output_dims(dims: &[i64]) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .map(|(axis, &dim)| match (axis, dim) {
            (_, d) if d > 0 => d as usize,
            (0, _) => 1,
            _ => 0,
        })
        .collect()
}
