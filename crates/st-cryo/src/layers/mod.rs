// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Neural layers used by the reconstruction core: dense, residual, activation,
//! and the sequential container, plus builders for the coordinate decoder and
//! image encoder topologies.

pub mod activation;
pub mod linear;
pub mod residual;
pub mod sequential;

pub use activation::Relu;
pub use linear::Linear;
pub use residual::ResidLinear;
pub use sequential::Sequential;

use crate::PureResult;

/// Builds a plain ReLU multilayer perceptron `in_dim -> hidden^layers -> out_dim`.
pub fn mlp(
    name: &str,
    in_dim: usize,
    hidden_layers: usize,
    hidden_dim: usize,
    out_dim: usize,
    seed: Option<u64>,
) -> PureResult<Sequential> {
    let mut seq = Sequential::new();
    seq.push(Linear::with_seed(
        format!("{name}::in"),
        in_dim,
        hidden_dim,
        seed,
    )?);
    seq.push(Relu::new());
    for layer in 0..hidden_layers.saturating_sub(1) {
        seq.push(Linear::with_seed(
            format!("{name}::hidden{layer}"),
            hidden_dim,
            hidden_dim,
            seed.map(|s| s.wrapping_add(layer as u64 + 1)),
        )?);
        seq.push(Relu::new());
    }
    seq.push(Linear::with_seed(
        format!("{name}::out"),
        hidden_dim,
        out_dim,
        seed.map(|s| s.wrapping_add(0x5eed)),
    )?);
    Ok(seq)
}

/// Builds a residual ReLU network, the topology the coordinate decoder uses:
/// `in_dim -> hidden`, then `hidden_layers` residual blocks, then `-> out_dim`.
pub fn resid_mlp(
    name: &str,
    in_dim: usize,
    hidden_layers: usize,
    hidden_dim: usize,
    out_dim: usize,
    seed: Option<u64>,
) -> PureResult<Sequential> {
    let mut seq = Sequential::new();
    seq.push(Linear::with_seed(
        format!("{name}::in"),
        in_dim,
        hidden_dim,
        seed,
    )?);
    seq.push(Relu::new());
    for layer in 0..hidden_layers {
        seq.push(ResidLinear::with_seed(
            format!("{name}::resid{layer}"),
            hidden_dim,
            seed.map(|s| s.wrapping_add(layer as u64 + 1)),
        )?);
        seq.push(Relu::new());
    }
    seq.push(Linear::with_seed(
        format!("{name}::out"),
        hidden_dim,
        out_dim,
        seed.map(|s| s.wrapping_add(0x5eed)),
    )?);
    Ok(seq)
}
