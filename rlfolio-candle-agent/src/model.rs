//! Interface of neural networks used in RL agents.
use crate::PolicyDist;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use std::path::Path;

/// Neural network model not owing its [`VarMap`] internally.
///
/// [`VarMap`]: candle_nn::VarMap
pub trait SubModel1 {
    /// Configuration from which [`SubModel1`] is constructed.
    type Config;

    /// Input of the [`SubModel1`].
    type Input;

    /// Output of the [`SubModel1`].
    type Output;

    /// Builds [`SubModel1`] with [`VarBuilder`] and [`SubModel1::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output>;
}

/// A network giving the policy distribution and the state value of a batch of states.
///
/// Consumed by [`Ppo`](crate::ppo::Ppo). The model owns its parameters and optimizer.
pub trait PolicyValueModel {
    /// Device of the parameters.
    fn device(&self) -> &Device;

    /// Policy distribution and values of shape `(batch_size,)` for `obs` of shape
    /// `(batch_size, state_dim)`.
    ///
    /// `train` is set on optimization steps. Normalization layers use batch
    /// statistics then, and their running statistics otherwise.
    fn forward(&mut self, obs: &Tensor, train: bool) -> Result<(PolicyDist, Tensor)>;

    /// Applies one optimizer step on the gradient of `loss`.
    fn backward_step(&mut self, loss: &Tensor) -> Result<()>;

    /// Current learning rate of the optimizer.
    fn learning_rate(&self) -> f64;

    /// Sets the learning rate of the optimizer.
    fn set_learning_rate(&mut self, lr: f64);

    /// Saves the parameters in the given directory.
    fn save(&self, path: &Path) -> Result<()>;

    /// Loads the parameters from the given directory.
    fn load(&mut self, path: &Path) -> Result<()>;
}
