// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Generative composition: rotation in, rotated lattice through the symmetric
//! decoder, Hartley image out. The image encoder lives outside this core; it
//! hands feature vectors to the SO(3) reparameterizer and latent heads, and
//! the rotation fed into [`GenerativeModel::forward`] may equally come from
//! an external pose search.

use crate::decoder::SymmetricSliceDecoder;
use crate::lattice::Lattice;
use crate::module::Parameter;
use crate::so3::SamplingMode;
use crate::{PureResult, Tensor, TensorError};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

/// Mean and log-variance of the conformation code for one image.
#[derive(Clone, Debug)]
pub struct LatentStatistics {
    mu: Tensor,
    logvar: Tensor,
}

impl LatentStatistics {
    /// Wraps matching `1 x zdim` mean and log-variance rows.
    pub fn new(mu: Tensor, logvar: Tensor) -> PureResult<Self> {
        if mu.shape() != logvar.shape() || mu.shape().0 != 1 {
            return Err(TensorError::ShapeMismatch {
                left: mu.shape(),
                right: logvar.shape(),
            });
        }
        Ok(Self { mu, logvar })
    }

    /// Latent mean row.
    pub fn mu(&self) -> &Tensor {
        &self.mu
    }

    /// Latent log-variance row.
    pub fn logvar(&self) -> &Tensor {
        &self.logvar
    }

    /// Draws a latent code, or returns the mean in `Eval` mode.
    pub fn reparameterize(&self, mode: SamplingMode, rng: &mut StdRng) -> PureResult<Tensor> {
        match mode {
            SamplingMode::Eval => Ok(self.mu.clone()),
            SamplingMode::Train => {
                let cols = self.mu.shape().1;
                let mut data = Vec::with_capacity(cols);
                for (&mu, &logvar) in self.mu.data().iter().zip(self.logvar.data().iter()) {
                    let eps: f64 = rng.sample(StandardNormal);
                    data.push(mu + (0.5 * logvar).exp() * eps as f32);
                }
                Tensor::from_vec(1, cols, data)
            }
        }
    }

    /// Closed-form KL divergence against the unit Gaussian prior,
    /// `-0.5 * mean(1 + logvar - mu^2 - exp(logvar))`.
    ///
    /// A non-finite statistic is surfaced as an error so the training driver
    /// can abort; it is never clamped here.
    pub fn kld(&self) -> PureResult<f32> {
        let mut total = 0.0f32;
        for (&mu, &logvar) in self.mu.data().iter().zip(self.logvar.data().iter()) {
            total += 1.0 + logvar - mu * mu - logvar.exp();
        }
        let kld = -0.5 * total / self.mu.len() as f32;
        if !kld.is_finite() {
            return Err(TensorError::NonFiniteValue {
                label: "kld",
                value: kld,
            });
        }
        Ok(kld)
    }
}

/// Central-slice generative model over a shared lattice.
#[derive(Debug)]
pub struct GenerativeModel {
    lattice: Lattice,
    decoder: SymmetricSliceDecoder,
    zdim: usize,
}

impl GenerativeModel {
    /// Composes a lattice and a symmetric decoder; `zdim = 0` disables latent
    /// conditioning. The lattice must be the square grid the decoder indexes.
    pub fn new(lattice: Lattice, decoder: SymmetricSliceDecoder, zdim: usize) -> PureResult<Self> {
        let side = decoder.index().side();
        if lattice.width() != side || lattice.height() != side {
            return Err(TensorError::ShapeMismatch {
                left: (lattice.height(), lattice.width()),
                right: (side, side),
            });
        }
        debug!(side, zdim, "assembled generative model");
        Ok(Self {
            lattice,
            decoder,
            zdim,
        })
    }

    /// Builds a model with a residual MLP coordinate decoder over
    /// `3 + zdim` inputs.
    pub fn with_topology(
        d: usize,
        zdim: usize,
        hidden_layers: usize,
        hidden_dim: usize,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        let core = crate::layers::resid_mlp("decoder", 3 + zdim, hidden_layers, hidden_dim, 2, seed)?;
        let decoder = SymmetricSliceDecoder::new(d, core)?;
        Self::new(Lattice::new(d, d)?, decoder, zdim)
    }

    /// The shared query lattice.
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// The symmetric slice decoder.
    pub fn decoder(&self) -> &SymmetricSliceDecoder {
        &self.decoder
    }

    /// Width of the conformation code, zero when unconditioned.
    pub fn zdim(&self) -> usize {
        self.zdim
    }

    /// Splits a `1 x 2*zdim` latent head output into mean and log-variance.
    pub fn encode_latent(&self, head: &Tensor) -> PureResult<LatentStatistics> {
        if self.zdim == 0 || head.shape() != (1, 2 * self.zdim) {
            return Err(TensorError::ShapeMismatch {
                left: head.shape(),
                right: (1, 2 * self.zdim),
            });
        }
        let data = head.data();
        let mu = Tensor::from_vec(1, self.zdim, data[..self.zdim].to_vec())?;
        let logvar = Tensor::from_vec(1, self.zdim, data[self.zdim..].to_vec())?;
        LatentStatistics::new(mu, logvar)
    }

    /// Broadcasts a `1 x zdim` code across every coordinate row and
    /// concatenates it column-wise. No cross-pixel coupling is introduced.
    pub fn cat_latent(&self, coords: &Tensor, z: &Tensor) -> PureResult<Tensor> {
        if z.shape() != (1, self.zdim) {
            return Err(TensorError::ShapeMismatch {
                left: z.shape(),
                right: (1, self.zdim),
            });
        }
        let rows = coords.shape().0;
        let code = z.data();
        let tiled = Tensor::from_fn(rows, self.zdim, |_r, c| code[c])?;
        Tensor::cat_cols(&[coords, &tiled])
    }

    /// Synthesises a `d x d` Hartley-domain image for one orientation.
    ///
    /// The rotation may come from [`crate::so3::SO3Reparameterizer`] or from
    /// an external pose search; either way it is validated before use. `z`
    /// must be present exactly when the model was built with `zdim > 0`.
    pub fn forward(&self, rotation: &Tensor, z: Option<&Tensor>) -> PureResult<Tensor> {
        let rotated = self.lattice.rotate(rotation)?;
        let coords = match (self.zdim, z) {
            (0, None) => rotated,
            (_, Some(code)) if self.zdim > 0 => self.cat_latent(&rotated, code)?,
            _ => {
                return Err(TensorError::InvalidValue {
                    label: "latent_code_presence",
                })
            }
        };
        self.decoder.reconstruct_image(&coords)
    }

    /// Visits every learnable parameter of the decoder core.
    pub fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.decoder.visit_parameters(visitor)
    }

    /// Visits every learnable parameter of the decoder core mutably.
    pub fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.decoder.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn identity_rotation() -> Tensor {
        Tensor::from_fn(3, 3, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap()
    }

    #[test]
    fn kld_of_standard_normal_statistics_is_zero() {
        let stats =
            LatentStatistics::new(Tensor::zeros(1, 4).unwrap(), Tensor::zeros(1, 4).unwrap())
                .unwrap();
        assert_eq!(stats.kld().unwrap(), 0.0);
    }

    #[test]
    fn kld_surfaces_non_finite_statistics() {
        let mu = Tensor::from_vec(1, 2, vec![f32::NAN, 0.0]).unwrap();
        let stats = LatentStatistics::new(mu, Tensor::zeros(1, 2).unwrap()).unwrap();
        match stats.kld() {
            Err(TensorError::NonFiniteValue { label, .. }) => assert_eq!(label, "kld"),
            other => panic!("expected NonFiniteValue, got {other:?}"),
        }
    }

    #[test]
    fn eval_reparameterization_returns_the_mean() {
        let mu = Tensor::from_vec(1, 3, vec![0.3, -0.2, 1.5]).unwrap();
        let stats = LatentStatistics::new(mu.clone(), Tensor::zeros(1, 3).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let z = stats.reparameterize(SamplingMode::Eval, &mut rng).unwrap();
        assert_eq!(z, mu);
    }

    #[test]
    fn forward_requires_latent_exactly_when_conditioned() {
        let unconditioned = GenerativeModel::with_topology(4, 0, 1, 8, Some(1)).unwrap();
        let conditioned = GenerativeModel::with_topology(4, 2, 1, 8, Some(1)).unwrap();
        let rot = identity_rotation();
        let z = Tensor::from_vec(1, 2, vec![0.5, -0.5]).unwrap();

        assert!(unconditioned.forward(&rot, None).is_ok());
        assert!(unconditioned.forward(&rot, Some(&z)).is_err());
        assert!(conditioned.forward(&rot, Some(&z)).is_ok());
        assert!(conditioned.forward(&rot, None).is_err());
    }

    #[test]
    fn forward_produces_a_square_image() {
        let model = GenerativeModel::with_topology(8, 0, 2, 16, Some(9)).unwrap();
        let image = model.forward(&identity_rotation(), None).unwrap();
        assert_eq!(image.shape(), (8, 8));
    }

    #[test]
    fn encode_latent_splits_head_output() {
        let model = GenerativeModel::with_topology(4, 2, 1, 8, Some(1)).unwrap();
        let head = Tensor::from_vec(1, 4, vec![0.1, 0.2, -1.0, -2.0]).unwrap();
        let stats = model.encode_latent(&head).unwrap();
        assert_eq!(stats.mu().data(), &[0.1, 0.2]);
        assert_eq!(stats.logvar().data(), &[-1.0, -2.0]);
    }

    #[test]
    fn cat_latent_broadcasts_without_coupling() {
        let model = GenerativeModel::with_topology(4, 2, 1, 8, Some(1)).unwrap();
        let coords = model.lattice().coords();
        let z = Tensor::from_vec(1, 2, vec![7.0, -3.0]).unwrap();
        let joined = model.cat_latent(coords, &z).unwrap();
        assert_eq!(joined.shape(), (16, 5));
        for row in 0..16 {
            assert_eq!(joined.get(row, 3).unwrap(), 7.0);
            assert_eq!(joined.get(row, 4).unwrap(), -3.0);
        }
    }
}
