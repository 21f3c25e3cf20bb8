// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::layers::linear::Linear;
use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Linear layer with an identity skip connection, `y = Wx + b + x`.
///
/// Input and output widths must match for the skip to be well defined.
#[derive(Debug)]
pub struct ResidLinear {
    linear: Linear,
    dim: usize,
}

impl ResidLinear {
    /// Creates a residual linear block over a square weight.
    pub fn new(name: impl Into<String>, dim: usize) -> PureResult<Self> {
        Ok(Self {
            linear: Linear::new(name, dim, dim)?,
            dim,
        })
    }

    /// Creates a residual linear block with seeded random initial weights.
    pub fn with_seed(name: impl Into<String>, dim: usize, seed: Option<u64>) -> PureResult<Self> {
        Ok(Self {
            linear: Linear::with_seed(name, dim, dim, seed)?,
            dim,
        })
    }
}

impl Module for ResidLinear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.dim {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: (self.dim, self.dim),
            });
        }
        let mut out = self.linear.forward(input)?;
        out.add_scaled(input, 1.0)?;
        Ok(out)
    }

    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor> {
        let mut grad_input = self.linear.backward(input, grad_output)?;
        grad_input.add_scaled(grad_output, 1.0)?;
        Ok(grad_input)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.linear.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.linear.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resid_forward_adds_identity() {
        let block = ResidLinear::new("res", 3).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -1.0, 0.5]).unwrap();
        let plain = block.linear.forward(&input).unwrap();
        let out = block.forward(&input).unwrap();
        let expected = plain.add(&input).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn resid_rejects_width_mismatch() {
        let block = ResidLinear::new("res", 3).unwrap();
        let input = Tensor::zeros(1, 4).unwrap();
        assert!(block.forward(&input).is_err());
    }
}
