// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lie-group tools for SO(3) and the rotation reparameterizer.
//!
//! Orientations are 3x3 orthonormal matrices with determinant +1, applied on
//! the right of row-vector coordinates. Mean orientations come from a
//! six-dimensional head orthogonalised Gram-Schmidt style; stochastic
//! perturbations live in the Lie algebra and reach the group through the
//! exponential map (Rodrigues' formula).

use crate::layers::Linear;
use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Minimum direction norm accepted by the frame orthogonalisation.
const FRAME_TOLERANCE: f64 = 1e-8;

/// Skew-symmetric generator of the infinitesimal rotation `w`.
pub fn skew(w: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -w.z, w.y, w.z, 0.0, -w.x, -w.y, w.x, 0.0)
}

/// Exponential map so(3) -> SO(3) via Rodrigues' formula.
///
/// Near the identity the `sin`/`cos` coefficients switch to their Taylor
/// expansions so the zero tangent maps to the identity exactly and gradients
/// stay finite through the origin.
pub fn expmap(w: &Vector3<f64>) -> Matrix3<f64> {
    let theta_sq = w.dot(w);
    let theta = theta_sq.sqrt();
    let (a, b) = if theta < 1e-8 {
        (1.0 - theta_sq / 6.0, 0.5 - theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta_sq)
    };
    let k = skew(w);
    Matrix3::identity() + k * a + k * k * b
}

/// Orthogonalises two 3-vectors into a right-handed rotation matrix.
///
/// The first vector is normalised, the second is projected orthogonal to it,
/// and the cross product completes the basis; the rows of the result are the
/// three unit directions. Degenerate or non-finite inputs surface as
/// [`TensorError::DegenerateFrame`] instead of being clamped.
pub fn s2s2_to_rotation(a: &Vector3<f64>, b: &Vector3<f64>) -> PureResult<Matrix3<f64>> {
    let a_norm = a.norm();
    if !a_norm.is_finite() || a_norm < FRAME_TOLERANCE {
        return Err(TensorError::DegenerateFrame {
            norm: a_norm as f32,
        });
    }
    let e1 = a / a_norm;
    let u2 = b - e1 * e1.dot(b);
    let u2_norm = u2.norm();
    if !u2_norm.is_finite() || u2_norm < FRAME_TOLERANCE {
        return Err(TensorError::DegenerateFrame {
            norm: u2_norm as f32,
        });
    }
    let e2 = u2 / u2_norm;
    let e3 = e1.cross(&e2);
    Ok(Matrix3::from_rows(&[
        e1.transpose(),
        e2.transpose(),
        e3.transpose(),
    ]))
}

/// Checks that a tensor holds a 3x3 rotation within the given tolerance.
pub fn ensure_rotation(matrix: &Tensor, tolerance: f32) -> PureResult<()> {
    if matrix.shape() != (3, 3) {
        return Err(TensorError::ShapeMismatch {
            left: matrix.shape(),
            right: (3, 3),
        });
    }
    let m = tensor_to_matrix3(matrix)?;
    let gram = m.transpose() * m;
    let mut deviation = 0.0f64;
    for r in 0..3 {
        for c in 0..3 {
            let expected = if r == c { 1.0 } else { 0.0 };
            deviation = deviation.max((gram[(r, c)] - expected).abs());
        }
    }
    let det = m.determinant();
    if !deviation.is_finite() || deviation > tolerance as f64 || (det - 1.0).abs() > 1e-2 {
        return Err(TensorError::NonOrthonormalRotation {
            deviation: deviation as f32,
        });
    }
    Ok(())
}

/// Converts a 3x3 tensor into an f64 matrix.
pub fn tensor_to_matrix3(tensor: &Tensor) -> PureResult<Matrix3<f64>> {
    if tensor.shape() != (3, 3) {
        return Err(TensorError::ShapeMismatch {
            left: tensor.shape(),
            right: (3, 3),
        });
    }
    let d = tensor.data();
    Ok(Matrix3::new(
        d[0] as f64,
        d[1] as f64,
        d[2] as f64,
        d[3] as f64,
        d[4] as f64,
        d[5] as f64,
        d[6] as f64,
        d[7] as f64,
        d[8] as f64,
    ))
}

/// Casts an f64 matrix down to a 3x3 working-precision tensor.
pub fn matrix3_to_tensor(matrix: &Matrix3<f64>) -> PureResult<Tensor> {
    Tensor::from_fn(3, 3, |r, c| matrix[(r, c)] as f32)
}

/// Explicit sampling mode; training draws a perturbation, evaluation is
/// deterministic. Passed per call so no hidden flag couples the sampler to
/// the training driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingMode {
    Train,
    Eval,
}

/// Gaussian over orientations: a mean rotation and a per-axis standard
/// deviation in the Lie algebra.
#[derive(Clone, Debug)]
pub struct RotationGaussian {
    mean: Tensor,
    std: Tensor,
}

impl RotationGaussian {
    /// Mean rotation, 3x3.
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// Per-axis tangent standard deviation, 1x3, always non-negative.
    pub fn std(&self) -> &Tensor {
        &self.std
    }
}

/// A drawn orientation together with the tangent vector that generated it.
///
/// The tangent is exactly zero when no stochastic perturbation was applied.
#[derive(Clone, Debug)]
pub struct RotationSample {
    rotation: Tensor,
    tangent: Tensor,
}

impl RotationSample {
    /// The sampled 3x3 rotation.
    pub fn rotation(&self) -> &Tensor {
        &self.rotation
    }

    /// The Lie-algebra tangent that produced the perturbation, 1x3.
    pub fn tangent(&self) -> &Tensor {
        &self.tangent
    }

    /// Whether a stochastic perturbation was applied.
    pub fn is_stochastic(&self) -> bool {
        self.tangent.data().iter().any(|&value| value != 0.0)
    }
}

/// Maps encoder features to a Gaussian over SO(3) and draws samples from it.
///
/// Two independent linear heads produce a six-dimensional frame and a
/// three-dimensional log-variance. The frame is orthogonalised in f64 and the
/// result cast back to f32: the Gram-Schmidt step is ill-conditioned for
/// nearly parallel directions, so the upcast is a required stability measure,
/// not an optimisation target.
#[derive(Debug)]
pub struct SO3Reparameterizer {
    frame_head: Linear,
    logvar_head: Linear,
}

impl SO3Reparameterizer {
    /// Creates the two projection heads over `feature_dim` inputs.
    pub fn new(name: &str, feature_dim: usize, seed: Option<u64>) -> PureResult<Self> {
        Ok(Self {
            frame_head: Linear::with_seed(format!("{name}::frame"), feature_dim, 6, seed)?,
            logvar_head: Linear::with_seed(
                format!("{name}::logvar"),
                feature_dim,
                3,
                seed.map(|s| s.wrapping_add(1)),
            )?,
        })
    }

    /// Encodes a batch of feature rows into per-row rotation Gaussians.
    pub fn encode(&self, features: &Tensor) -> PureResult<Vec<RotationGaussian>> {
        let frames = self.frame_head.forward(features)?;
        let logvars = self.logvar_head.forward(features)?;
        let rows = features.shape().0;
        let mut out = Vec::with_capacity(rows);
        for row in 0..rows {
            let f = &frames.data()[row * 6..(row + 1) * 6];
            let a = Vector3::new(f[0] as f64, f[1] as f64, f[2] as f64);
            let b = Vector3::new(f[3] as f64, f[4] as f64, f[5] as f64);
            let mean = matrix3_to_tensor(&s2s2_to_rotation(&a, &b)?)?;
            let lv = &logvars.data()[row * 3..(row + 1) * 3];
            let std = Tensor::from_vec(1, 3, lv.iter().map(|&v| (0.5 * v).exp()).collect())?;
            out.push(RotationGaussian { mean, std });
        }
        Ok(out)
    }

    /// Draws an orientation from the Gaussian.
    ///
    /// `Train` perturbs the mean by `expmap(eps * std)` with `eps` drawn from
    /// the injected RNG and reports the generating tangent; `Eval` returns the
    /// mean unchanged with a zero tangent and leaves the RNG untouched.
    pub fn sample(
        &self,
        gaussian: &RotationGaussian,
        mode: SamplingMode,
        rng: &mut StdRng,
    ) -> PureResult<RotationSample> {
        match mode {
            SamplingMode::Eval => Ok(RotationSample {
                rotation: gaussian.mean.clone(),
                tangent: Tensor::zeros(1, 3)?,
            }),
            SamplingMode::Train => {
                let std = gaussian.std.data();
                let mut w = [0.0f32; 3];
                for (value, &std) in w.iter_mut().zip(std.iter()) {
                    let eps: f64 = rng.sample(StandardNormal);
                    *value = eps as f32 * std;
                }
                let tangent = Vector3::new(w[0] as f64, w[1] as f64, w[2] as f64);
                let perturbation = expmap(&tangent);
                let mean = tensor_to_matrix3(&gaussian.mean)?;
                let rotation = matrix3_to_tensor(&(mean * perturbation))?;
                Ok(RotationSample {
                    rotation,
                    tangent: Tensor::from_vec(1, 3, w.to_vec())?,
                })
            }
        }
    }

    /// Visits the parameters of both projection heads.
    pub fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.frame_head.visit_parameters(visitor)?;
        self.logvar_head.visit_parameters(visitor)?;
        Ok(())
    }

    /// Visits the parameters of both projection heads mutably.
    pub fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.frame_head.visit_parameters_mut(visitor)?;
        self.logvar_head.visit_parameters_mut(visitor)?;
        Ok(())
    }
}
