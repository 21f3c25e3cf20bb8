// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Variational reconstruction core for 3D density fields observed through 2D
//! projection images with unknown orientation and conformation.
//!
//! The crate covers the numerically delicate heart of the pipeline: sampling
//! rotations from a distribution on SO(3) through the exponential map, and a
//! central-slice decoder that exploits the Hermitian symmetry of the Hartley
//! spectral representation to evaluate only half of each slice. Everything is
//! pure and batched: image I/O, pose search, annealing schedules, and the
//! optimizer loop live with external collaborators.

pub mod decoder;
pub mod lattice;
pub mod layers;
pub mod loss;
pub mod model;
pub mod module;
pub mod so3;
pub mod volume;

pub use decoder::{SliceSymmetryIndex, SymmetricSliceDecoder};
pub use lattice::Lattice;
pub use layers::{mlp, resid_mlp, Linear, Relu, ResidLinear, Sequential};
pub use loss::{Loss, MeanSquaredError};
pub use model::{GenerativeModel, LatentStatistics};
pub use module::{Module, Parameter};
pub use so3::{
    expmap, s2s2_to_rotation, RotationGaussian, RotationSample, SO3Reparameterizer, SamplingMode,
};
pub use volume::evaluate_volume;

pub use st_field::{PureResult, Tensor, TensorError};
