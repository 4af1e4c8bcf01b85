//! Configuration of a run.
use anyhow::Result;
use rlfolio_candle_agent::{dqn::DqnConfig, ppo::PpoConfig};
use rlfolio_core::{
    env::MarketEnvConfig, rollout::RolloutBufferConfig, BenchmarkConfig, TrainerConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Everything a run needs besides the series and the seeds.
///
/// Sections not used by the chosen command are ignored.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct RunConfig {
    /// Group of runs, the first level under the output directory.
    pub out_class: String,

    /// Name of the run, appended to the date of the run directory.
    pub model_name: String,

    /// Market environment.
    pub env: MarketEnvConfig,

    /// PPO agent.
    pub ppo: PpoConfig,

    /// Rollout buffer of PPO.
    pub rollout: RolloutBufferConfig,

    /// PPO training loop.
    pub trainer: TrainerConfig,

    /// Benchmark loop.
    pub benchmark: BenchmarkConfig,

    /// DQN agent of the benchmark loop.
    pub dqn: DqnConfig,

    /// If set, the capacity of the replay buffer is `int(n_train * max_exp_pct)`.
    pub max_exp_pct: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            out_class: "rlfolio".to_string(),
            model_name: "run".to_string(),
            env: MarketEnvConfig::default(),
            ppo: PpoConfig::default(),
            rollout: RolloutBufferConfig::default(),
            trainer: TrainerConfig::default(),
            benchmark: BenchmarkConfig::default(),
            dqn: DqnConfig::default(),
            max_exp_pct: None,
        }
    }
}

impl RunConfig {
    /// Constructs [`RunConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RunConfig`] as a YAML file.
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
    fn test_partial_yaml() -> Result<()> {
        let yaml = "model_name: ppo_flat\nenv:\n  n_train: 50\ntrainer:\n  episodes: 3\n";
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        assert_eq!(config.model_name, "ppo_flat");
        assert_eq!(config.out_class, "rlfolio");
        assert_eq!(config.env.n_train, 50);
        assert_eq!(config.trainer.episodes, 3);
        assert_eq!(config.rollout, RolloutBufferConfig::default());

        let dir = TempDir::new("run_config")?;
        let path = dir.path().join("config.yaml");
        config.save(&path)?;
        assert_eq!(RunConfig::load(&path)?, config);
        Ok(())
    }
}
