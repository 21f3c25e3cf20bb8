// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::model::GenerativeModel;
use crate::{PureResult, Tensor, TensorError};
use tracing::debug;

/// Materialises a dense spectral volume by sweeping the identity-oriented
/// lattice through depth.
///
/// Slice by slice keeps the peak memory at one plane; offsets follow the
/// half-open `linspace(-1, 1, depth)` the lattice itself uses. `zval` fixes
/// the conformation code for every slice and must be present exactly when the
/// model is latent-conditioned. Persisting the returned stack is the external
/// collaborator's job.
pub fn evaluate_volume(
    model: &GenerativeModel,
    zval: Option<&Tensor>,
    depth: usize,
) -> PureResult<Vec<Tensor>> {
    if depth == 0 {
        return Err(TensorError::EmptyInput("evaluate_volume"));
    }
    debug!(depth, zdim = model.zdim(), "evaluating volume");
    let mut slices = Vec::with_capacity(depth);
    for step in 0..depth {
        let dz = -1.0 + 2.0 * step as f32 / depth as f32;
        let plane = model.lattice().with_depth_offset(dz)?;
        let coords = match (model.zdim(), zval) {
            (0, None) => plane,
            (zdim, Some(code)) if zdim > 0 => model.cat_latent(&plane, code)?,
            _ => {
                return Err(TensorError::InvalidValue {
                    label: "latent_code_presence",
                })
            }
        };
        slices.push(model.decoder().reconstruct_image(&coords)?);
    }
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_has_one_square_slice_per_depth_step() {
        let model = GenerativeModel::with_topology(4, 0, 1, 8, Some(4)).unwrap();
        let slices = evaluate_volume(&model, None, 5).unwrap();
        assert_eq!(slices.len(), 5);
        for slice in &slices {
            assert_eq!(slice.shape(), (4, 4));
        }
    }

    #[test]
    fn conditioned_volume_requires_a_code() {
        let model = GenerativeModel::with_topology(4, 2, 1, 8, Some(4)).unwrap();
        assert!(evaluate_volume(&model, None, 2).is_err());
        let z = Tensor::from_vec(1, 2, vec![0.1, 0.2]).unwrap();
        assert!(evaluate_volume(&model, Some(&z), 2).is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let model = GenerativeModel::with_topology(4, 0, 1, 8, Some(4)).unwrap();
        assert!(evaluate_volume(&model, None, 0).is_err());
    }
}
