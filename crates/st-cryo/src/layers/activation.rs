// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Stateless ReLU activation; it does not participate in parameter visits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Relu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (rows, cols) = input.shape();
        let data = input.data().iter().map(|value| value.max(0.0)).collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        if input.shape() != grad_output.shape() {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: grad_output.shape(),
            });
        }
        let (rows, cols) = input.shape();
        let data = input
            .data()
            .iter()
            .zip(grad_output.data().iter())
            .map(|(&x, &g)| if x > 0.0 { g } else { 0.0 })
            .collect();
        Tensor::from_vec(rows, cols, data)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_clamps_negatives() {
        let input = Tensor::from_vec(1, 4, vec![-1.0, 0.0, 0.5, 2.0]).unwrap();
        let output = Relu::new().forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 0.5, 2.0]);
    }

    #[test]
    fn relu_gates_gradients() {
        let input = Tensor::from_vec(1, 3, vec![-1.0, 1.0, 0.0]).unwrap();
        let grad = Tensor::from_vec(1, 3, vec![5.0, 5.0, 5.0]).unwrap();
        let out = Relu::new().backward(&input, &grad).unwrap();
        assert_eq!(out.data(), &[0.0, 5.0, 0.0]);
    }
}
