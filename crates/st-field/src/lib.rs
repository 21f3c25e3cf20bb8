// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dense row-major `f32` tensor substrate for the cryo reconstruction core.
//!
//! The crate keeps the pure-CPU discipline of the wider SpiralTorch stack:
//! every fallible operation returns a [`PureResult`] and no function touches
//! hidden global state. Random initialisation routes through a seedable RNG
//! so batched evaluations stay reproducible under test.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result alias used throughout the field substrate and the crates above it.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor and reconstruction utilities.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorError {
    /// A tensor constructor received an invalid shape.
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor or operator does not match the tensor shape.
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A row or column access fell outside the tensor bounds.
    IndexOutOfBounds { index: usize, len: usize },
    /// Computation received an empty input which would otherwise trigger a panic.
    EmptyInput(&'static str),
    /// Attempted to load or update a parameter that was missing from the state dict.
    MissingParameter { name: String },
    /// Numeric guard detected a non-finite value that would otherwise propagate NaNs.
    NonFiniteValue { label: &'static str, value: f32 },
    /// Slice symmetry bookkeeping requires an even grid side length.
    NonEvenSideLength { side: usize },
    /// A matrix fed in as a rotation failed the orthonormality check.
    NonOrthonormalRotation { deviation: f32 },
    /// Frame orthogonalisation collapsed because the input directions were degenerate.
    DegenerateFrame { norm: f32 },
    /// Generic configuration violation for pure helpers.
    InvalidValue { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::InvalidDimensions { rows, cols } => {
                write!(
                    f,
                    "invalid tensor dimensions ({rows} x {cols}); both axes must be non-zero"
                )
            }
            TensorError::DataLength { expected, got } => {
                write!(f, "data length mismatch: expected {expected}, got {got}")
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for axis of length {len}")
            }
            TensorError::EmptyInput(label) => {
                write!(f, "{label} received an empty input")
            }
            TensorError::MissingParameter { name } => {
                write!(f, "parameter `{name}` missing from state dict")
            }
            TensorError::NonFiniteValue { label, value } => {
                write!(f, "{label} produced a non-finite value: {value}")
            }
            TensorError::NonEvenSideLength { side } => {
                write!(
                    f,
                    "slice symmetry indexing requires an even side length, got {side}"
                )
            }
            TensorError::NonOrthonormalRotation { deviation } => {
                write!(
                    f,
                    "matrix is not a rotation: orthonormality deviation {deviation}"
                )
            }
            TensorError::DegenerateFrame { norm } => {
                write!(
                    f,
                    "frame orthogonalisation degenerate: direction norm {norm} below tolerance"
                )
            }
            TensorError::InvalidValue { label } => {
                write!(f, "invalid value for {label}")
            }
        }
    }
}

impl std::error::Error for TensorError {}

/// Dense row-major matrix of `f32` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor {
    fn check_shape(rows: usize, cols: usize) -> PureResult<()> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        Ok(())
    }

    fn seedable_rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(value) => StdRng::seed_from_u64(value),
            None => StdRng::from_entropy(),
        }
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        Self::check_shape(rows, cols)?;
        Ok(Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        })
    }

    /// Creates a tensor from an owned row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        Self::check_shape(rows, cols)?;
        if data.len() != rows * cols {
            return Err(TensorError::DataLength {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Construct a tensor by applying a generator function to each coordinate.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        Self::check_shape(rows, cols)?;
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Ok(Self { rows, cols, data })
    }

    /// Construct a tensor by sampling a uniform distribution over `[min, max)`.
    pub fn random_uniform(
        rows: usize,
        cols: usize,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        Self::check_shape(rows, cols)?;
        if !(min < max) {
            return Err(TensorError::InvalidValue {
                label: "random_uniform_range",
            });
        }
        let mut rng = Self::seedable_rng(seed);
        let distribution = Uniform::new(min, max);
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            data.push(distribution.sample(&mut rng));
        }
        Ok(Self { rows, cols, data })
    }

    /// Construct a tensor by sampling a normal distribution with the provided
    /// mean and standard deviation.
    pub fn random_normal(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        Self::check_shape(rows, cols)?;
        if std <= 0.0 {
            return Err(TensorError::InvalidValue {
                label: "random_normal_std",
            });
        }
        let mut rng = Self::seedable_rng(seed);
        let gaussian = StandardNormal;
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let sample: f64 = gaussian.sample(&mut rng);
            data.push(mean + std * sample as f32);
        }
        Ok(Self { rows, cols, data })
    }

    /// Returns the `(rows, cols)` pair of the tensor.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the tensor holds no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Immutable view into the row-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view into the row-major buffer.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reads a single element with bounds checking.
    pub fn get(&self, row: usize, col: usize) -> PureResult<f32> {
        if row >= self.rows {
            return Err(TensorError::IndexOutOfBounds {
                index: row,
                len: self.rows,
            });
        }
        if col >= self.cols {
            return Err(TensorError::IndexOutOfBounds {
                index: col,
                len: self.cols,
            });
        }
        Ok(self.data[row * self.cols + col])
    }

    /// Returns `true` when every stored value is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|value| value.is_finite())
    }

    /// Dense matrix product `self · other`.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let mut out = vec![0.0f32; self.rows * other.cols];
        for r in 0..self.rows {
            for k in 0..self.cols {
                let lhs = self.data[r * self.cols + k];
                if lhs == 0.0 {
                    continue;
                }
                let row = &other.data[k * other.cols..(k + 1) * other.cols];
                let dst = &mut out[r * other.cols..(r + 1) * other.cols];
                for (d, &rhs) in dst.iter_mut().zip(row.iter()) {
                    *d += lhs * rhs;
                }
            }
        }
        Tensor::from_vec(self.rows, other.cols, out)
    }

    fn zip_map(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> PureResult<Tensor> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Scales every element by a constant.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        let data = self.data.iter().map(|&a| a * value).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Accumulates `other * scale` into `self` in place.
    pub fn add_scaled(&mut self, other: &Tensor, scale: f32) -> PureResult<()> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        for (dst, &src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst += src * scale;
        }
        Ok(())
    }

    /// Adds a row vector to every row of the tensor in place.
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for row in self.data.chunks_mut(self.cols) {
            for (dst, &src) in row.iter_mut().zip(bias.iter()) {
                *dst += src;
            }
        }
        Ok(())
    }

    /// Returns the transposed tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    /// Concatenates tensors with matching row counts along the column axis.
    pub fn cat_cols(tensors: &[&Tensor]) -> PureResult<Tensor> {
        let first = tensors.first().ok_or(TensorError::EmptyInput("cat_cols"))?;
        let rows = first.rows;
        let mut cols = 0;
        for tensor in tensors {
            if tensor.rows != rows {
                return Err(TensorError::ShapeMismatch {
                    left: first.shape(),
                    right: tensor.shape(),
                });
            }
            cols += tensor.cols;
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for tensor in tensors {
                let start = r * tensor.cols;
                data.extend_from_slice(&tensor.data[start..start + tensor.cols]);
            }
        }
        Tensor::from_vec(rows, cols, data)
    }

    /// Gathers the listed rows into a new tensor, preserving list order.
    pub fn select_rows(&self, indices: &[usize]) -> PureResult<Tensor> {
        if indices.is_empty() {
            return Err(TensorError::EmptyInput("select_rows"));
        }
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &index in indices {
            if index >= self.rows {
                return Err(TensorError::IndexOutOfBounds {
                    index,
                    len: self.rows,
                });
            }
            let start = index * self.cols;
            data.extend_from_slice(&self.data[start..start + self.cols]);
        }
        Tensor::from_vec(indices.len(), self.cols, data)
    }

    /// Sums the tensor along the row axis, producing one value per column.
    pub fn sum_axis0(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; self.cols];
        for row in self.data.chunks(self.cols) {
            for (dst, &src) in out.iter_mut().zip(row.iter()) {
                *dst += src;
            }
        }
        out
    }

    /// Squared L2 norm of the whole buffer.
    pub fn squared_l2_norm(&self) -> f32 {
        self.data.iter().map(|&value| value * value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_reject_zero_axes() {
        assert_eq!(
            Tensor::zeros(0, 3).unwrap_err(),
            TensorError::InvalidDimensions { rows: 0, cols: 3 }
        );
        assert_eq!(
            Tensor::from_vec(2, 2, vec![1.0]).unwrap_err(),
            TensorError::DataLength {
                expected: 4,
                got: 1
            }
        );
    }

    #[test]
    fn matmul_matches_manual() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn transpose_round_trips() {
        let a = Tensor::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(a.transpose().transpose(), a);
    }

    #[test]
    fn cat_cols_interleaves_rows() {
        let a = Tensor::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::from_vec(2, 1, vec![9.0, 8.0]).unwrap();
        let c = Tensor::cat_cols(&[&a, &b]).unwrap();
        assert_eq!(c.shape(), (2, 3));
        assert_eq!(c.data(), &[1.0, 2.0, 9.0, 3.0, 4.0, 8.0]);
    }

    #[test]
    fn select_rows_gathers_in_order() {
        let a = Tensor::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let picked = a.select_rows(&[2, 0]).unwrap();
        assert_eq!(picked.data(), &[5.0, 6.0, 1.0, 2.0]);
        assert!(a.select_rows(&[3]).is_err());
    }

    #[test]
    fn squared_l2_norm_sums_squares() {
        let a = Tensor::from_vec(1, 3, vec![1.0, -2.0, 2.0]).unwrap();
        assert_eq!(a.squared_l2_norm(), 9.0);
    }

    #[test]
    fn random_normal_is_seed_deterministic() {
        let a = Tensor::random_normal(4, 4, 0.0, 1.0, Some(7)).unwrap();
        let b = Tensor::random_normal(4, 4, 0.0, 1.0, Some(7)).unwrap();
        assert_eq!(a, b);
    }
}
