// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor, TensorError};
use std::collections::HashMap;

/// Trainable parameter with a locally cached Euclidean gradient.
///
/// The reconstruction core never steps its own parameters; the external
/// optimizer walks them through [`Module::visit_parameters_mut`] and decides
/// when to call [`Parameter::apply_step`].
pub struct Parameter {
    name: String,
    value: Tensor,
    gradient: Option<Tensor>,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(
            f,
            "Parameter(name={},shape=({},{}),has_grad={})",
            self.name,
            rows,
            cols,
            self.gradient.is_some()
        )
    }
}

impl Parameter {
    /// Creates a new parameter with the provided tensor value.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
            gradient: None,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides an immutable view into the underlying tensor value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Provides a mutable view into the underlying tensor value.
    pub fn value_mut(&mut self) -> &mut Tensor {
        &mut self.value
    }

    /// Returns the currently cached gradient, when one has been accumulated.
    pub fn gradient(&self) -> Option<&Tensor> {
        self.gradient.as_ref()
    }

    fn assert_shape(&self, tensor: &Tensor) -> PureResult<()> {
        if self.value.shape() != tensor.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: tensor.shape(),
            });
        }
        Ok(())
    }

    /// Accumulates a Euclidean gradient update into the local buffer.
    pub fn accumulate(&mut self, update: &Tensor) -> PureResult<()> {
        self.assert_shape(update)?;
        match self.gradient.as_mut() {
            Some(existing) => existing.add_scaled(update, 1.0)?,
            None => {
                self.gradient = Some(update.clone());
            }
        }
        Ok(())
    }

    /// Clears the cached gradient.
    pub fn zero_gradient(&mut self) {
        if let Some(grad) = self.gradient.as_mut() {
            for value in grad.data_mut() {
                *value = 0.0;
            }
        }
    }

    /// Applies the accumulated gradient with the supplied learning rate and
    /// clears the buffer.
    pub fn apply_step(&mut self, learning_rate: f32) -> PureResult<()> {
        if let Some(grad) = self.gradient.as_mut() {
            self.value.add_scaled(grad, -learning_rate)?;
            for value in grad.data_mut() {
                *value = 0.0;
            }
        }
        Ok(())
    }

    /// Replaces the parameter value with the provided tensor.
    pub fn load_value(&mut self, value: &Tensor) -> PureResult<()> {
        self.assert_shape(value)?;
        self.value = value.clone();
        Ok(())
    }
}

/// Module trait mirroring `nn.Module`, expressed through explicit composition
/// rather than inheritance-based registration.
pub trait Module {
    /// Runs a forward pass.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor>;

    /// Propagates a gradient backwards. Implementations populate the relevant
    /// parameter accumulators before returning the gradient with respect to
    /// `input`.
    fn backward(&mut self, input: &Tensor, grad_output: &Tensor) -> PureResult<Tensor>;

    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Applies every parameter update with a shared learning rate.
    fn apply_step(&mut self, learning_rate: f32) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| param.apply_step(learning_rate))
    }

    /// Clears accumulators across every parameter.
    fn zero_accumulators(&mut self) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })
    }

    /// Captures a copy of every parameter tensor keyed by its canonical name.
    fn state_dict(&self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Restores parameters from a state dictionary produced by [`Module::state_dict`].
    fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> PureResult<()> {
        self.visit_parameters_mut(&mut |param| {
            let Some(value) = state.get(param.name()) else {
                return Err(TensorError::MissingParameter {
                    name: param.name().to_string(),
                });
            };
            param.load_value(value)
        })
    }
}
