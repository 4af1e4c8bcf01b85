//! Configuration of [`BenchmarkRunner`](super::BenchmarkRunner).
use crate::qtable::QTableConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`BenchmarkRunner`](super::BenchmarkRunner).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Initial exploration rate.
    pub epsilon: f64,

    /// Final exploration rate.
    pub min_eps: f64,

    /// Fraction of the iterations after which `min_eps` is reached.
    pub min_eps_pct: f64,

    /// Runs the off-policy agent.
    pub execute_drl: bool,

    /// Runs the tabular agent.
    pub execute_q: bool,

    /// Runs the optimal-tracking benchmark.
    pub execute_gp: bool,

    /// Runs the Markowitz benchmark.
    pub execute_mv: bool,

    /// Number of checkpoints over the run, `0` disables them.
    pub save_ckpt_model: usize,

    /// Saves the result table at the end.
    pub save_results: bool,

    /// Saves the Q-table at the end.
    pub save_table: bool,

    /// Saves the parameters of the off-policy agent at the end.
    pub save_model: bool,

    /// Interval of flushing records in iterations.
    pub flush_record_interval: usize,

    /// Where the outputs are saved.
    pub out_dir: Option<String>,

    /// Configuration of the Q-table.
    pub qtable: QTableConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            min_eps: 0.1,
            min_eps_pct: 0.5,
            execute_drl: false,
            execute_q: true,
            execute_gp: true,
            execute_mv: true,
            save_ckpt_model: 0,
            save_results: true,
            save_table: true,
            save_model: true,
            flush_record_interval: 1_000,
            out_dir: None,
            qtable: QTableConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Sets the initial exploration rate.
    pub fn epsilon(mut self, v: f64) -> Self {
        self.epsilon = v;
        self
    }

    /// Sets the final exploration rate.
    pub fn min_eps(mut self, v: f64) -> Self {
        self.min_eps = v;
        self
    }

    /// Sets the fraction of the iterations after which `min_eps` is reached.
    pub fn min_eps_pct(mut self, v: f64) -> Self {
        self.min_eps_pct = v;
        self
    }

    /// Selects the tracks to run.
    pub fn tracks(mut self, drl: bool, q: bool, gp: bool, mv: bool) -> Self {
        self.execute_drl = drl;
        self.execute_q = q;
        self.execute_gp = gp;
        self.execute_mv = mv;
        self
    }

    /// Sets the number of checkpoints over the run.
    pub fn save_ckpt_model(mut self, v: usize) -> Self {
        self.save_ckpt_model = v;
        self
    }

    /// Selects the outputs saved at the end of the run.
    pub fn save_outputs(mut self, results: bool, table: bool, model: bool) -> Self {
        self.save_results = results;
        self.save_table = table;
        self.save_model = model;
        self
    }

    /// Sets the interval of flushing records in iterations.
    pub fn flush_record_interval(mut self, v: usize) -> Self {
        self.flush_record_interval = v;
        self
    }

    /// Sets the output directory.
    pub fn out_dir<T: Into<String>>(mut self, out_dir: T) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    /// Sets the configuration of the Q-table.
    pub fn qtable(mut self, v: QTableConfig) -> Self {
        self.qtable = v;
        self
    }

    /// Constructs [`BenchmarkConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`BenchmarkConfig`].
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
    fn test_serde_benchmark_config() -> Result<()> {
        let config = BenchmarkConfig::default()
            .epsilon(0.5)
            .tracks(true, false, true, false)
            .save_ckpt_model(4)
            .out_dir("outputs")
            .qtable(QTableConfig::default().lr(0.05));

        let dir = TempDir::new("benchmark_config")?;
        let path = dir.path().join("benchmark_config.yaml");
        config.save(&path)?;
        assert_eq!(config, BenchmarkConfig::load(&path)?);
        Ok(())
    }
}
