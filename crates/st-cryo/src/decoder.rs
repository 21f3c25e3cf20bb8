// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Hermitian-symmetric central-slice decoder.
//!
//! The coordinate decoder returns the real and imaginary channels of a 3D
//! spectral field. Because the underlying density is real-valued, the field
//! satisfies `F(-p) = conj(F(p))`, so a central slice only needs to be
//! evaluated on half of the pixel grid; the other half is filled from the
//! conjugate. The Hartley-domain image is `Re - Im`, and the mirrored half
//! becomes `Re + Im`. [`SliceSymmetryIndex`] carries the pixel bookkeeping
//! that stitches the two halves back together.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Precomputed pixel-index sets over the flat range `[0, d*d)` of an even
/// `d x d` grid.
///
/// For an interior pixel `k = j*d + i` with `i, j >= 1`, its spectral mirror
/// sits at `d*d + d - k`; the top row and left column (`i = 0` or `j = 0`)
/// have no mirror partner because the half-open coordinate grid excludes +1.
/// `all_eval` and `bottom_rev` are disjoint and together cover every pixel
/// exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SliceSymmetryIndex {
    d: usize,
    center: usize,
    extra: Vec<usize>,
    all_eval: Vec<usize>,
    top: Vec<usize>,
    bottom_rev: Vec<usize>,
}

impl SliceSymmetryIndex {
    /// Builds the index sets for an even side length `d`.
    pub fn new(d: usize) -> PureResult<Self> {
        if d == 0 || d % 2 != 0 {
            return Err(TensorError::NonEvenSideLength { side: d });
        }
        let d2 = d / 2;
        let center = d2 * d + d2;

        // bottom-left column pixels without a conjugate pair
        let extra: Vec<usize> = ((d2 + 1) * d..d * d).step_by(d).collect();

        let mut all_eval: Vec<usize> = (0..=center).collect();
        all_eval.extend_from_slice(&extra);

        // interior pixels of the top half, up to but excluding the center
        let mut top: Vec<usize> = (1..=d2)
            .flat_map(|j| (1..d).map(move |i| j * d + i))
            .collect();
        top.truncate(top.len() - d2);

        // interior pixels of the bottom half after the center, reverse scan
        let mut bottom_rev: Vec<usize> = (d2..d)
            .flat_map(|j| (1..d).map(move |i| j * d + i))
            .skip(d2)
            .collect();
        bottom_rev.reverse();

        debug!(
            d,
            evaluated = all_eval.len(),
            mirrored = bottom_rev.len(),
            "built slice symmetry index"
        );
        Ok(Self {
            d,
            center,
            extra,
            all_eval,
            top,
            bottom_rev,
        })
    }

    /// Grid side length.
    pub fn side(&self) -> usize {
        self.d
    }

    /// Flat index of the center pixel.
    pub fn center(&self) -> usize {
        self.center
    }

    /// Bottom-left column indices with no conjugate partner.
    pub fn extra(&self) -> &[usize] {
        &self.extra
    }

    /// Every pixel index actually sent to the learned decoder.
    pub fn all_eval(&self) -> &[usize] {
        &self.all_eval
    }

    /// Source indices whose decoded values feed the mirrored half.
    pub fn top(&self) -> &[usize] {
        &self.top
    }

    /// Destination indices of the mirrored half, in reverse scan order.
    pub fn bottom_rev(&self) -> &[usize] {
        &self.bottom_rev
    }
}

/// Evaluates a learned coordinate-to-spectrum decoder on the symmetry-reduced
/// half of a slice and reconstructs the full Hartley-domain image.
#[derive(Debug)]
pub struct SymmetricSliceDecoder {
    core: crate::layers::Sequential,
    index: SliceSymmetryIndex,
}

impl SymmetricSliceDecoder {
    /// Wraps a two-channel coordinate decoder for `d x d` slices.
    ///
    /// `core` maps `n x k` coordinate blocks (`k >= 3`; spatial components
    /// first, any latent code after) to `n x 2` real/imaginary channels.
    /// Odd `d` is rejected up front because every index computation below
    /// assumes an even grid.
    pub fn new(d: usize, core: crate::layers::Sequential) -> PureResult<Self> {
        let index = SliceSymmetryIndex::new(d)?;
        Ok(Self { core, index })
    }

    /// The symmetry bookkeeping for this decoder's grid.
    pub fn index(&self) -> &SliceSymmetryIndex {
        &self.index
    }

    /// Evaluates the core decoder under the Hermitian convention.
    ///
    /// Rows whose third component is strictly positive are evaluated at the
    /// negated coordinate and their imaginary channel conjugated, so the
    /// effective field always satisfies `F(-p) = conj(F(p))` regardless of
    /// what the core network learned. The caller's coordinate tensor is
    /// copied, never mutated.
    pub fn decode_half(&self, coords: &Tensor) -> PureResult<(Tensor, Tensor)> {
        let (rows, cols) = coords.shape();
        if cols < 3 {
            return Err(TensorError::ShapeMismatch {
                left: coords.shape(),
                right: (rows, 3),
            });
        }
        let mut canonical = coords.clone();
        let mut flipped = vec![false; rows];
        for (row, chunk) in canonical.data_mut().chunks_mut(cols).enumerate() {
            if chunk[2] > 0.0 {
                chunk[0] = -chunk[0];
                chunk[1] = -chunk[1];
                chunk[2] = -chunk[2];
                flipped[row] = true;
            }
        }
        let spectrum = self.core.forward(&canonical)?;
        if spectrum.shape() != (rows, 2) {
            return Err(TensorError::ShapeMismatch {
                left: spectrum.shape(),
                right: (rows, 2),
            });
        }
        let mut real = Vec::with_capacity(rows);
        let mut imag = Vec::with_capacity(rows);
        for (row, pair) in spectrum.data().chunks(2).enumerate() {
            real.push(pair[0]);
            imag.push(if flipped[row] { -pair[1] } else { pair[1] });
        }
        Ok((
            Tensor::from_vec(rows, 1, real)?,
            Tensor::from_vec(rows, 1, imag)?,
        ))
    }

    /// Reconstructs a full `d x d` Hartley image from slice coordinates.
    ///
    /// Only the `all_eval` rows are decoded; the mirrored half is filled from
    /// the conjugate, reading `top` in order and writing `bottom_rev` in its
    /// reverse scan order. Every pixel is written exactly once.
    pub fn reconstruct_image(&self, coords: &Tensor) -> PureResult<Tensor> {
        let d = self.index.d;
        if coords.shape().0 != d * d {
            return Err(TensorError::ShapeMismatch {
                left: coords.shape(),
                right: (d * d, coords.shape().1),
            });
        }
        let half = coords.select_rows(&self.index.all_eval)?;
        let (real, imag) = self.decode_half(&half)?;
        let real = real.data();
        let imag = imag.data();

        let mut image = vec![0.0f32; d * d];
        for (pos, &pixel) in self.index.all_eval.iter().enumerate() {
            image[pixel] = real[pos] - imag[pos];
        }
        // top indices all precede the center pixel, so they address the
        // evaluated block directly
        for (&src, &dst) in self.index.top.iter().zip(self.index.bottom_rev.iter()) {
            image[dst] = real[src] + imag[src];
        }
        Tensor::from_vec(d, d, image)
    }

    /// Reconstructs a centered `1 x (2c+1)` strip around the origin.
    ///
    /// Rows `0..=c` of `coords` are decoded; the remaining half mirrors them
    /// through the center, `out[c + m] = Re[c - m] + Im[c - m]` for
    /// `m = 1..=c`. The center row itself is not mirrored.
    pub fn reconstruct_partial_symmetric(
        &self,
        coords: &Tensor,
        center: usize,
    ) -> PureResult<Tensor> {
        let rows = coords.shape().0;
        if rows != 2 * center + 1 {
            return Err(TensorError::ShapeMismatch {
                left: coords.shape(),
                right: (2 * center + 1, coords.shape().1),
            });
        }
        let evaluated: Vec<usize> = (0..=center).collect();
        let half = coords.select_rows(&evaluated)?;
        let (real, imag) = self.decode_half(&half)?;
        let real = real.data();
        let imag = imag.data();

        let mut strip = vec![0.0f32; rows];
        for pos in 0..=center {
            strip[pos] = real[pos] - imag[pos];
        }
        for m in 1..=center {
            strip[center + m] = real[center - m] + imag[center - m];
        }
        Tensor::from_vec(1, rows, strip)
    }

    /// Visits the core decoder's parameters.
    pub fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.core.visit_parameters(visitor)
    }

    /// Visits the core decoder's parameters mutably.
    pub fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.core.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_rejects_odd_and_zero_sides() {
        for side in [0usize, 3, 7, 65] {
            match SliceSymmetryIndex::new(side) {
                Err(TensorError::NonEvenSideLength { side: got }) => assert_eq!(got, side),
                other => panic!("expected NonEvenSideLength for {side}, got {other:?}"),
            }
        }
    }

    #[test]
    fn index_sets_for_side_four() {
        let index = SliceSymmetryIndex::new(4).unwrap();
        assert_eq!(index.center(), 10);
        assert_eq!(index.extra(), &[12]);
        assert_eq!(
            index.all_eval(),
            &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12]
        );
        assert_eq!(index.top(), &[5, 6, 7, 9]);
        assert_eq!(index.bottom_rev(), &[15, 14, 13, 11]);
    }

    #[test]
    fn all_eval_and_bottom_rev_partition_the_grid() {
        for d in [4usize, 6, 8, 16, 32] {
            let index = SliceSymmetryIndex::new(d).unwrap();
            assert_eq!(index.top().len(), index.bottom_rev().len());
            let mut seen = vec![0u8; d * d];
            for &pixel in index.all_eval() {
                seen[pixel] += 1;
            }
            for &pixel in index.bottom_rev() {
                seen[pixel] += 1;
            }
            assert!(
                seen.iter().all(|&count| count == 1),
                "side {d}: every pixel must be covered exactly once"
            );
        }
    }

    #[test]
    fn mirror_pairs_obey_the_negation_law() {
        // pixel (i, j) mirrors to (d - i, d - j): flat d*d + d - k
        for d in [4usize, 8, 12] {
            let index = SliceSymmetryIndex::new(d).unwrap();
            for (&src, &dst) in index.top().iter().zip(index.bottom_rev().iter()) {
                assert_eq!(src + dst, d * d + d);
            }
        }
    }

    #[test]
    fn top_indices_address_the_evaluated_block() {
        for d in [4usize, 6, 10] {
            let index = SliceSymmetryIndex::new(d).unwrap();
            for &src in index.top() {
                assert!(src < index.center());
                assert_eq!(index.all_eval()[src], src);
            }
        }
    }
}
