//! Configuration of [`MarketEnv`](super::MarketEnv).
use crate::error::RlfolioError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Representation of the state seen by the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateRepr {
    /// A single `(return, holding)` pair.
    Flat,

    /// The last `n` `(return, holding)` pairs, most recent last.
    Window(usize),
}

impl StateRepr {
    /// Number of `(return, holding)` rows in a state.
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Flat => 1,
            Self::Window(n) => *n,
        }
    }
}

/// Configuration of [`MarketEnv`](super::MarketEnv).
///
/// `klm` is `[action half-width, step, holding half-width]`: the action space
/// is `-klm[0]..=klm[0]` and the holding space `-klm[2]..=klm[2]`, both
/// stepping by `klm[1]`. The return space is `(-ret_ticks..=ret_ticks) * ret_tick`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct MarketEnvConfig {
    /// Holding at reset.
    pub start_holding: f64,

    /// Volatility of the returns.
    pub sigma: f64,

    /// Multiplier of the quadratic trading cost `0.5 * a^2 * cost_multiplier * sigma^2`.
    pub cost_multiplier: f64,

    /// Risk aversion.
    pub kappa: f64,

    /// Annual discount rate of the optimal-tracking benchmark.
    pub discount_rate: f64,

    /// Loading of the expected return on each factor.
    pub f_param: Vec<f64>,

    /// Number of training steps, used to name output files.
    pub n_train: usize,

    /// State representation.
    pub state_repr: StateRepr,

    /// Action/holding grid, see the type-level documentation.
    pub klm: [f64; 3],

    /// Number of return ticks on each side of zero.
    pub ret_ticks: usize,

    /// Size of a return tick.
    pub ret_tick: f64,

    /// Whether the action space contains the zero trade.
    pub zero_action: bool,
}

impl Default for MarketEnvConfig {
    fn default() -> Self {
        Self {
            start_holding: 0.0,
            sigma: 0.01,
            cost_multiplier: 0.001,
            kappa: 0.001,
            discount_rate: 0.0,
            f_param: vec![0.001],
            n_train: 1_000,
            state_repr: StateRepr::Flat,
            klm: [20.0, 10.0, 100.0],
            ret_ticks: 20,
            ret_tick: 0.005,
            zero_action: true,
        }
    }
}

impl MarketEnvConfig {
    /// Sets the holding at reset.
    pub fn start_holding(mut self, v: f64) -> Self {
        self.start_holding = v;
        self
    }

    /// Sets the volatility.
    pub fn sigma(mut self, v: f64) -> Self {
        self.sigma = v;
        self
    }

    /// Sets the cost multiplier.
    pub fn cost_multiplier(mut self, v: f64) -> Self {
        self.cost_multiplier = v;
        self
    }

    /// Sets the risk aversion.
    pub fn kappa(mut self, v: f64) -> Self {
        self.kappa = v;
        self
    }

    /// Sets the annual discount rate.
    pub fn discount_rate(mut self, v: f64) -> Self {
        self.discount_rate = v;
        self
    }

    /// Sets the factor loadings.
    pub fn f_param(mut self, v: Vec<f64>) -> Self {
        self.f_param = v;
        self
    }

    /// Sets the number of training steps.
    pub fn n_train(mut self, v: usize) -> Self {
        self.n_train = v;
        self
    }

    /// Sets the state representation.
    pub fn state_repr(mut self, v: StateRepr) -> Self {
        self.state_repr = v;
        self
    }

    /// Sets the action/holding grid.
    pub fn klm(mut self, v: [f64; 3]) -> Self {
        self.klm = v;
        self
    }

    /// Sets the return grid.
    pub fn ret_grid(mut self, ticks: usize, tick: f64) -> Self {
        self.ret_ticks = ticks;
        self.ret_tick = tick;
        self
    }

    /// Sets whether the zero trade belongs to the action space.
    pub fn zero_action(mut self, v: bool) -> Self {
        self.zero_action = v;
        self
    }

    /// Checks the parameters that the reward and benchmark formulas divide by.
    pub fn validate(&self) -> Result<(), RlfolioError> {
        if !(self.kappa > 0.0) {
            return Err(RlfolioError::InvalidConfig(format!(
                "kappa must be positive, got {}",
                self.kappa
            )));
        }
        if !(self.sigma > 0.0) {
            return Err(RlfolioError::InvalidConfig(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if !(self.cost_multiplier > 0.0) {
            return Err(RlfolioError::InvalidConfig(format!(
                "cost_multiplier must be positive, got {}",
                self.cost_multiplier
            )));
        }
        if let StateRepr::Window(0) = self.state_repr {
            return Err(RlfolioError::InvalidConfig("empty state window".into()));
        }
        Ok(())
    }

    /// Constructs [`MarketEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MarketEnvConfig`].
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
    fn test_serde_market_env_config() -> Result<()> {
        let config = MarketEnvConfig::default()
            .kappa(0.5)
            .state_repr(StateRepr::Window(5))
            .f_param(vec![0.1, 0.2]);

        let dir = TempDir::new("market_env_config")?;
        let path = dir.path().join("env.yaml");
        config.save(&path)?;
        let config_ = MarketEnvConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(MarketEnvConfig::default().validate().is_ok());
        assert!(MarketEnvConfig::default().kappa(0.0).validate().is_err());
        assert!(MarketEnvConfig::default()
            .state_repr(StateRepr::Window(0))
            .validate()
            .is_err());
    }
}
