use crate::util::OutDim;
use serde::{Deserialize, Serialize};

/// Activation function of the hidden layers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit.
    #[default]
    Relu,

    /// Hyperbolic tangent.
    Tanh,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp).
pub struct MlpConfig {
    pub(super) in_dim: usize,
    pub(super) units: Vec<usize>,
    pub(super) out_dim: usize,
    #[serde(default)]
    pub(super) activation: Activation,
    #[serde(default)]
    pub(super) small_head: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// Hidden layers are initialized with Xavier uniform weights and zero bias.
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation: Activation::default(),
            small_head: false,
        }
    }

    /// Sets the activation function of the hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// If `true`, the output layer starts with `N(0, 0.01)` weights and a bias of `0.01`.
    pub fn small_head(mut self, v: bool) -> Self {
        self.small_head = v;
        self
    }

    /// Input dimension.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Sets the input dimension.
    pub fn set_in_dim(&mut self, v: usize) {
        self.in_dim = v;
    }
}

impl OutDim for MlpConfig {
    fn get_out_dim(&self) -> usize {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: usize) {
        self.out_dim = out_dim;
    }
}
