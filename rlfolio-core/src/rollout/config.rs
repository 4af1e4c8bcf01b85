//! Configuration of [`RolloutBuffer`](super::RolloutBuffer).
use crate::error::RlfolioError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutBuffer`](super::RolloutBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct RolloutBufferConfig {
    /// Discount factor.
    pub gamma: f64,

    /// GAE smoothing factor (`lambda` in the literature).
    pub tau: f64,

    /// Number of transitions in a minibatch.
    pub batch_size: usize,

    /// Seed of the minibatch sampler.
    pub seed: u64,
}

impl Default for RolloutBufferConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.95,
            batch_size: 64,
            seed: 42,
        }
    }
}

impl RolloutBufferConfig {
    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the GAE smoothing factor.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub(super) fn validate(&self) -> Result<(), RlfolioError> {
        if self.batch_size == 0 {
            return Err(RlfolioError::InvalidConfig("batch_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.tau) {
            return Err(RlfolioError::InvalidConfig(format!(
                "gamma and tau must lie in [0, 1], got {} and {}",
                self.gamma, self.tau
            )));
        }
        Ok(())
    }

    /// Constructs [`RolloutBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RolloutBufferConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
