// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::so3;
use crate::{PureResult, Tensor, TensorError};
use tracing::debug;

/// Orthonormality tolerance applied to rotations fed into [`Lattice::rotate`].
pub const ROTATION_TOLERANCE: f32 = 1e-4;

/// Plane of query coordinates, one 3-vector per output pixel.
///
/// Coordinates span `[-1, 1)` on each axis (the spectral grid is not
/// symmetric around the origin, so the right endpoint is excluded) with
/// `z = 0`, laid out in row-major pixel order. The lattice is immutable after
/// construction and can be shared freely across concurrent evaluations.
#[derive(Clone, Debug)]
pub struct Lattice {
    width: usize,
    height: usize,
    coords: Tensor,
}

impl Lattice {
    /// Builds the pixel coordinate plane for a `width x height` image.
    pub fn new(width: usize, height: usize) -> PureResult<Self> {
        if width == 0 || height == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: height,
                cols: width,
            });
        }
        let coords = Tensor::from_fn(width * height, 3, |pixel, axis| {
            let x = pixel % width;
            let y = pixel / width;
            match axis {
                0 => -1.0 + 2.0 * x as f32 / width as f32,
                1 => -1.0 + 2.0 * y as f32 / height as f32,
                _ => 0.0,
            }
        })?;
        debug!(width, height, "constructed pixel lattice");
        Ok(Self {
            width,
            height,
            coords,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The `width*height x 3` coordinate tensor.
    pub fn coords(&self) -> &Tensor {
        &self.coords
    }

    /// Rotates every coordinate by the supplied rotation, `coords · R`.
    ///
    /// The rotation is applied on the right of row-vector coordinates; the
    /// same convention the SO(3) sampler uses. A matrix that is not
    /// orthonormal with determinant +1 is rejected rather than silently
    /// producing a plausible-looking slice.
    pub fn rotate(&self, rotation: &Tensor) -> PureResult<Tensor> {
        so3::ensure_rotation(rotation, ROTATION_TOLERANCE)?;
        self.coords.matmul(rotation)
    }

    /// Returns a copy of the coordinates translated by `(0, 0, dz)`.
    ///
    /// Used by the volume evaluator to sweep the plane through depth; the
    /// stored coordinates are never mutated.
    pub fn with_depth_offset(&self, dz: f32) -> PureResult<Tensor> {
        if !dz.is_finite() {
            return Err(TensorError::NonFiniteValue {
                label: "depth_offset",
                value: dz,
            });
        }
        let mut coords = self.coords.clone();
        for row in coords.data_mut().chunks_mut(3) {
            row[2] += dz;
        }
        Ok(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_follow_half_open_linspace() {
        let lattice = Lattice::new(4, 4).unwrap();
        let coords = lattice.coords();
        assert_eq!(coords.shape(), (16, 3));
        // pixel (0, 0)
        assert_eq!(coords.get(0, 0).unwrap(), -1.0);
        assert_eq!(coords.get(0, 1).unwrap(), -1.0);
        // pixel (3, 0): x = -1 + 2*3/4
        assert!((coords.get(3, 0).unwrap() - 0.5).abs() < 1e-6);
        // +1 is never on the grid
        for pixel in 0..16 {
            assert!(coords.get(pixel, 0).unwrap() < 1.0);
            assert!(coords.get(pixel, 1).unwrap() < 1.0);
            assert_eq!(coords.get(pixel, 2).unwrap(), 0.0);
        }
    }

    #[test]
    fn identity_rotation_is_a_no_op() {
        let lattice = Lattice::new(6, 6).unwrap();
        let identity = Tensor::from_fn(3, 3, |r, c| if r == c { 1.0 } else { 0.0 }).unwrap();
        let rotated = lattice.rotate(&identity).unwrap();
        assert_eq!(&rotated, lattice.coords());
    }

    #[test]
    fn rotate_rejects_non_orthonormal_matrices() {
        let lattice = Lattice::new(4, 4).unwrap();
        let scaled = Tensor::from_fn(3, 3, |r, c| if r == c { 2.0 } else { 0.0 }).unwrap();
        match lattice.rotate(&scaled) {
            Err(TensorError::NonOrthonormalRotation { .. }) => {}
            other => panic!("expected NonOrthonormalRotation, got {other:?}"),
        }
    }

    #[test]
    fn depth_offset_copies_instead_of_mutating() {
        let lattice = Lattice::new(4, 4).unwrap();
        let before = lattice.coords().clone();
        let offset = lattice.with_depth_offset(0.25).unwrap();
        assert_eq!(&before, lattice.coords());
        assert!((offset.get(0, 2).unwrap() - 0.25).abs() < 1e-6);
    }
}
