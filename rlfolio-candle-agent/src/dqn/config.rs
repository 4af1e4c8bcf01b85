//! Configuration of DQN agent.
use super::DqnModelConfig;
use crate::{mlp::MlpConfig, opt::OptimizerConfig, util::CriticLoss, Device};
use anyhow::Result;
use rlfolio_core::{
    error::RlfolioError,
    spaces::{ActionSpace, DiscreteSpace},
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Update rule of the target network.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetUpdate {
    /// Copy the weights every `copy_step` iterations.
    #[default]
    Hard,

    /// Move the weights towards the Q-network by `tau` at every iteration.
    Soft,
}

/// Configuration of [`Dqn`](super::Dqn).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct DqnConfig {
    /// Configuration of the Q-network.
    pub model_config: DqnModelConfig<MlpConfig>,

    /// Size of the minibatches.
    pub batch_size: usize,

    /// Discount factor of the TD target.
    pub discount_factor: f64,

    /// Update rule of the target network.
    pub target_update: TargetUpdate,

    /// Step size of soft updates.
    pub tau: f64,

    /// Iterations between two updates of the target network.
    pub copy_step: usize,

    /// Iterations before the first optimization step.
    pub start_train: usize,

    /// Capacity of the replay buffer.
    pub capacity: usize,

    /// Loss of the TD error.
    pub critic_loss: CriticLoss,

    /// Seed of exploration and replay sampling.
    pub seed: u64,

    /// Device of the parameters.
    pub device: Device,

    /// Trades, one per output of the Q-network.
    pub action_values: Vec<f64>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            model_config: DqnModelConfig::new(
                MlpConfig::new(2, vec![64, 64], 1),
                OptimizerConfig::adam(1e-3),
            ),
            batch_size: 32,
            discount_factor: 0.99,
            target_update: TargetUpdate::Hard,
            tau: 0.01,
            copy_step: 1000,
            start_train: 1000,
            capacity: 10000,
            critic_loss: CriticLoss::Mse,
            seed: 42,
            device: Device::Cpu,
            action_values: vec![],
        }
    }
}

impl DqnConfig {
    /// Sets the trades and the output dimension of the Q-network.
    pub fn action_space(mut self, space: &ActionSpace) -> Self {
        self.action_values = space.values().to_vec();
        self.model_config = self.model_config.out_dim(self.action_values.len());
        self
    }

    /// Sets the input dimension of the Q-network.
    pub fn state_dim(mut self, v: usize) -> Self {
        self.model_config.q_config.set_in_dim(v);
        self
    }

    /// Sets the configuration of the Q-network.
    pub fn q_config(mut self, v: MlpConfig) -> Self {
        self.model_config = self.model_config.q_config(v);
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.model_config = self.model_config.opt_config(v);
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the update rule of the target network.
    pub fn target_update(mut self, v: TargetUpdate, tau: f64, copy_step: usize) -> Self {
        self.target_update = v;
        self.tau = tau;
        self.copy_step = copy_step;
        self
    }

    /// Sets the number of warm-up iterations.
    pub fn start_train(mut self, v: usize) -> Self {
        self.start_train = v;
        self
    }

    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, v: usize) -> Self {
        self.capacity = v;
        self
    }

    /// Sets the capacity to `int(n_train * max_exp_pct)`.
    pub fn max_exp_pct(self, n_train: usize, max_exp_pct: f64) -> Self {
        self.capacity((n_train as f64 * max_exp_pct) as usize)
    }

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Checks the combination of settings.
    pub fn validate(&self) -> Result<(), RlfolioError> {
        let err = |msg: String| Err(RlfolioError::InvalidConfig(msg));

        if self.target_update == TargetUpdate::Soft && self.copy_step != 1 {
            return err(format!(
                "soft target updates require copy_step to be 1, got {}",
                self.copy_step
            ));
        }
        if self.copy_step == 0 {
            return err("copy_step must be positive".into());
        }
        if self.batch_size == 0 || self.capacity < self.batch_size {
            return err(format!(
                "replay buffer of capacity {} cannot give batches of {}",
                self.capacity, self.batch_size
            ));
        }
        if self.action_values.is_empty() {
            return err("no action values".into());
        }
        if self.model_config.get_out_dim() != self.action_values.len() {
            return err(format!(
                "Q-network output {} for {} actions",
                self.model_config.get_out_dim(),
                self.action_values.len()
            ));
        }
        Ok(())
    }

    /// Constructs [`DqnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn config() -> Result<DqnConfig> {
        Ok(DqnConfig::default().action_space(&ActionSpace::new(1.0, 1.0, true)?))
    }

    #[test]
    fn test_soft_update_requires_copy_step_1() -> Result<()> {
        let config = config()?.target_update(TargetUpdate::Soft, 0.01, 10);
        assert!(matches!(
            config.validate(),
            Err(RlfolioError::InvalidConfig(_))
        ));

        let config = config.target_update(TargetUpdate::Soft, 0.01, 1);
        assert_eq!(config.validate(), Ok(()));
        Ok(())
    }

    #[test]
    fn test_invalid_buffer() -> Result<()> {
        assert!(config()?.capacity(0).validate().is_err());
        assert!(config()?.batch_size(0).validate().is_err());
        assert!(DqnConfig::default().validate().is_err());
        assert_eq!(config()?.max_exp_pct(1000, 0.5).capacity, 500);
        Ok(())
    }

    #[test]
    fn test_serde_dqn_config() -> Result<()> {
        let config = config()?.critic_loss(CriticLoss::SmoothL1).seed(3);
        let dir = TempDir::new("dqn_config")?;
        let path = dir.path().join("dqn_config.yaml");
        config.save(&path)?;
        assert_eq!(config, DqnConfig::load(&path)?);
        Ok(())
    }
}
