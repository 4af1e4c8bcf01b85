//! Configuration of PPO agent.
use super::ActorCriticConfig;
use anyhow::Result;
use rlfolio_core::spaces::{ActionSpace, ContinuousActionRange, DiscreteSpace, PolicyType};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ppo`](super::Ppo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct PpoConfig {
    /// Configuration of the actor-critic network.
    pub model: ActorCriticConfig,

    /// Half-width of the clipping interval of the probability ratio.
    pub clip_param: f64,

    /// Coefficient of the critic loss.
    pub vf_coef: f64,

    /// Coefficient of the entropy bonus.
    pub ent_coef: f64,

    /// Range of trades of a continuous policy.
    pub action_range: Option<ContinuousActionRange>,

    /// Trades of a discrete policy, one per logit.
    pub action_values: Vec<f64>,

    /// Multiplier of the learning rate after each optimization step.
    pub lr_decay: Option<f64>,

    /// Seed of the random number generator used for sampling actions.
    pub seed: u64,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            model: ActorCriticConfig::default(),
            clip_param: 0.2,
            vf_coef: 0.5,
            ent_coef: 0.01,
            action_range: None,
            action_values: vec![],
            lr_decay: None,
            seed: 42,
        }
    }
}

impl PpoConfig {
    /// Gaussian policy over trades in `range`.
    pub fn continuous(mut self, range: ContinuousActionRange) -> Self {
        self.model.policy_type = PolicyType::Continuous;
        self.model.out_dim = 1;
        self.action_range = Some(range);
        self
    }

    /// Categorical policy over the members of `space`.
    pub fn discrete(mut self, space: &ActionSpace) -> Self {
        self.model.policy_type = PolicyType::Discrete;
        self.model.out_dim = space.n_actions(PolicyType::Discrete);
        self.action_values = space.values().to_vec();
        self
    }

    /// Sets the input dimension of the networks.
    pub fn state_dim(mut self, v: usize) -> Self {
        self.model.in_dim = v;
        self
    }

    /// Sets the configuration of the actor-critic network.
    pub fn model(mut self, v: ActorCriticConfig) -> Self {
        self.model = v;
        self
    }

    /// Sets the clipping parameter.
    pub fn clip_param(mut self, v: f64) -> Self {
        self.clip_param = v;
        self
    }

    /// Sets the coefficient of the critic loss.
    pub fn vf_coef(mut self, v: f64) -> Self {
        self.vf_coef = v;
        self
    }

    /// Sets the coefficient of the entropy bonus.
    pub fn ent_coef(mut self, v: f64) -> Self {
        self.ent_coef = v;
        self
    }

    /// Sets the exponential decay of the learning rate.
    pub fn lr_decay(mut self, v: Option<f64>) -> Self {
        self.lr_decay = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self.model.seed = v;
        self
    }

    /// Constructs [`PpoConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoConfig`] as a YAML file.
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

    #[test]
    fn test_serde_ppo_config() -> Result<()> {
        let space = ActionSpace::new(2.0, 1.0, true)?;
        let config = PpoConfig::default()
            .state_dim(6)
            .discrete(&space)
            .lr_decay(Some(0.999))
            .seed(7);
        assert_eq!(config.model.out_dim, 5);

        let dir = TempDir::new("ppo_config")?;
        let path = dir.path().join("ppo_config.yaml");
        config.save(&path)?;
        let config_ = PpoConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
