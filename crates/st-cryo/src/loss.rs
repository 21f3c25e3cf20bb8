// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor};

/// Loss functions pair a scalar forward value with the gradient of the
/// prediction. The external driver combines the reconstruction term with
/// [`crate::model::LatentStatistics::kld`] under its own annealing weight.
pub trait Loss {
    /// Computes the scalar loss as a `1 x 1` tensor.
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;

    /// Computes the gradient of the loss with respect to the prediction.
    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor>;
}

/// Classic mean squared error loss with mean reduction.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    /// Creates a new mean squared error loss instance.
    pub fn new() -> Self {
        Self
    }
}

impl Loss for MeanSquaredError {
    fn forward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        let diff = prediction.sub(target)?;
        let mean = diff.squared_l2_norm() / diff.len() as f32;
        Tensor::from_vec(1, 1, vec![mean])
    }

    fn backward(&mut self, prediction: &Tensor, target: &Tensor) -> PureResult<Tensor> {
        let diff = prediction.sub(target)?;
        let scale = 2.0 / diff.len() as f32;
        diff.scale(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_forward_backward() {
        let mut loss = MeanSquaredError::new();
        let prediction = Tensor::from_vec(1, 3, vec![0.5, -0.5, 1.0]).unwrap();
        let target = Tensor::from_vec(1, 3, vec![0.0, 0.0, 1.5]).unwrap();
        let value = loss.forward(&prediction, &target).unwrap();
        assert!((value.data()[0] - 0.25).abs() < 1e-6);

        let grad = loss.backward(&prediction, &target).unwrap();
        assert_eq!(grad.data().len(), 3);
        assert!(grad.data()[0] > 0.0);
        assert!(grad.data()[1] < 0.0);
    }

    #[test]
    fn mse_rejects_mismatched_shapes() {
        let mut loss = MeanSquaredError::new();
        let prediction = Tensor::zeros(1, 3).unwrap();
        let target = Tensor::zeros(1, 2).unwrap();
        assert!(loss.forward(&prediction, &target).is_err());
        assert!(loss.backward(&prediction, &target).is_err());
    }
}
