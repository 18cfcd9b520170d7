/**
This module computes a parameterised scalar mixture of N tensors, `gamma * sum(s_k * tensor_k)`
where `s = softmax(w)`, with `w` and `gamma` scalar parameters. The tensors can optionally be
layer-normalized over their masked positions before being mixed.
*/
use crate::metrics::ConfigurationError;
use ndarray::{prelude::*, ScalarOperand};
use num::Float;
use std::fmt::Debug;

/// Added to the variance before taking its square root.
const LAYER_NORM_EPSILON: f64 = 1e-12;

/// Floats supported by the mixture.
pub trait FloatExt: Float + Send + Sync + Clone + ScalarOperand + Debug {}

impl<T: Float + Send + Sync + Clone + Copy + ScalarOperand + Debug> FloatExt for T {}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarMix<F: FloatExt> {
    scalar_parameters: Vec<F>,
    gamma: F,
    do_layer_norm: bool,
}

impl<F: FloatExt> ScalarMix<F> {
    /// Mixture of `mixture_size` tensors. Every tensor gets the same weight and `gamma` is 1.
    pub fn new(mixture_size: usize, do_layer_norm: bool) -> Self {
        Self {
            scalar_parameters: vec![F::zero(); mixture_size],
            gamma: F::one(),
            do_layer_norm,
        }
    }

    /// Mixture with explicit scalar parameters (before the softmax) and `gamma`. The mixture size
    /// is the number of scalar parameters.
    pub fn with_parameters(scalar_parameters: Vec<F>, gamma: F, do_layer_norm: bool) -> Self {
        Self {
            scalar_parameters,
            gamma,
            do_layer_norm,
        }
    }

    pub fn mixture_size(&self) -> usize {
        self.scalar_parameters.len()
    }

    pub fn scalar_parameters(&self) -> &[F] {
        &self.scalar_parameters
    }

    pub fn gamma(&self) -> F {
        self.gamma
    }

    pub fn do_layer_norm(&self) -> bool {
        self.do_layer_norm
    }

    /// Softmax of the scalar parameters.
    pub fn normalized_weights(&self) -> Vec<F> {
        let max = self
            .scalar_parameters
            .iter()
            .copied()
            .fold(F::neg_infinity(), F::max);
        let exponentials: Vec<F> = self
            .scalar_parameters
            .iter()
            .map(|&w| (w - max).exp())
            .collect();
        let total = exponentials.iter().fold(F::zero(), |acc, &e| acc + e);
        exponentials.into_iter().map(|e| e / total).collect()
    }

    /// Computes the weighted average of the tensors. All tensors must have the same
    /// `(batch, sequence, dim)` shape. The mask, of shape `(batch, sequence)`, is only used (and
    /// required) when doing layer normalization.
    pub fn forward<M: PartialEq + Default + Clone>(
        &self,
        tensors: &[ArrayView3<F>],
        mask: Option<ArrayView2<M>>,
    ) -> Result<Array3<F>, ConfigurationError> {
        if self.mixture_size() == 0 {
            return Err(ConfigurationError::EmptyMixture);
        }
        if tensors.len() != self.mixture_size() {
            return Err(ConfigurationError::WrongNumberOfTensors {
                expected: self.mixture_size(),
                actual: tensors.len(),
            });
        }
        let shape = match tensors.first() {
            Some(tensor) => tensor.raw_dim(),
            None => return Err(ConfigurationError::EmptyMixture),
        };
        if let Some(tensor) = tensors.iter().find(|t| t.raw_dim() != shape) {
            return Err(ConfigurationError::ShapeMismatch {
                what: "tensors",
                expected: shape.slice().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        let weights = self.normalized_weights();
        let mut mixed = Array3::<F>::zeros(shape.clone());
        if self.do_layer_norm {
            let mask = mask.ok_or(ConfigurationError::MissingMask)?;
            let (batch_size, sequence_length, input_dim) = shape.into_pattern();
            if mask.dim() != (batch_size, sequence_length) {
                return Err(ConfigurationError::ShapeMismatch {
                    what: "mask",
                    expected: vec![batch_size, sequence_length],
                    actual: mask.shape().to_vec(),
                });
            }
            let mask_float: Array2<F> =
                mask.mapv(|m| if m == M::default() { F::zero() } else { F::one() });
            let num_elements_not_masked = mask_float.sum()
                * F::from(input_dim).expect("Casting from usize to float should always be possible");
            if num_elements_not_masked == F::zero() {
                return Err(ConfigurationError::EmptyMask);
            }
            let broadcast_mask = mask_float.insert_axis(Axis(2));
            for (&weight, tensor) in weights.iter().zip(tensors) {
                let normalized = layer_norm(tensor, &broadcast_mask, num_elements_not_masked);
                mixed.zip_mut_with(&normalized, |m, &x| *m = *m + weight * x);
            }
        } else {
            for (&weight, tensor) in weights.iter().zip(tensors) {
                mixed.zip_mut_with(tensor, |m, &x| *m = *m + weight * x);
            }
        }
        Ok(mixed * self.gamma)
    }
}

/// Standardizes `tensor` with the mean and variance of its masked elements.
fn layer_norm<F: FloatExt>(
    tensor: &ArrayView3<F>,
    broadcast_mask: &Array3<F>,
    num_elements_not_masked: F,
) -> Array3<F> {
    let tensor_masked = tensor * broadcast_mask;
    let mean = tensor_masked.sum() / num_elements_not_masked;
    let centered = tensor_masked.mapv(|v| v - mean) * broadcast_mask;
    let variance = centered.mapv(|v| v * v).sum() / num_elements_not_masked;
    let epsilon = F::from(LAYER_NORM_EPSILON).expect("Casting from f64 to float should always be possible");
    let std = (variance + epsilon).sqrt();
    tensor.mapv(|v| (v - mean) / std)
}
