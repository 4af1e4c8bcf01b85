//! Tabular Q-learning over the discretized `(return, holding)` states.
use crate::{
    env::{State, TrackResult},
    error::RlfolioError,
    spaces::{ActionSpace, DiscreteSpace, HoldingSpace, ReturnSpace},
    util::{self, format_thousands},
};
use anyhow::{anyhow, Result};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Initial value of the zero trade, so that doing nothing wins ties before learning.
const ZERO_ACTION_INIT: f64 = 1e-10;

/// Configuration of [`QTable`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct QTableConfig {
    /// Learning rate of the TD update.
    pub lr: f64,

    /// Discount factor.
    pub gamma: f64,

    /// Seed of the exploration RNG.
    pub seed: u64,
}

impl Default for QTableConfig {
    fn default() -> Self {
        Self {
            lr: 0.1,
            gamma: 0.9,
            seed: 42,
        }
    }
}

impl QTableConfig {
    /// Sets the learning rate.
    pub fn lr(mut self, v: f64) -> Self {
        self.lr = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }
}

/// Action values of every discretized state.
///
/// Rows are the product of the return and holding grids (return-major),
/// columns are the members of the action space. States are looked up by
/// exact equality, so they must come from
/// [`MarketEnv::discrete_reset`](crate::env::MarketEnv::discrete_reset) or
/// [`MarketEnv::discrete_step`](crate::env::MarketEnv::discrete_step).
pub struct QTable {
    returns: Vec<f64>,
    holdings: Vec<f64>,
    actions: Vec<f64>,
    values: Vec<f64>,
    lr: f64,
    gamma: f64,
    rng: StdRng,
}

impl QTable {
    /// Table of zeros, except `1e-10` for the zero trade.
    pub fn new(
        return_space: &ReturnSpace,
        holding_space: &HoldingSpace,
        action_space: &ActionSpace,
        config: &QTableConfig,
    ) -> Self {
        let actions = action_space.values().to_vec();
        let n_rows = return_space.len() * holding_space.len();
        let row: Vec<f64> = actions
            .iter()
            .map(|a| if *a == 0.0 { ZERO_ACTION_INIT } else { 0.0 })
            .collect();
        let values = (0..n_rows).flat_map(|_| row.iter().cloned()).collect();

        Self {
            returns: return_space.values().to_vec(),
            holdings: holding_space.values().to_vec(),
            actions,
            values,
            lr: config.lr,
            gamma: config.gamma,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn row(&self, state: &State) -> Result<usize, RlfolioError> {
        let not_found = || RlfolioError::StateNotFound(state.ret(), state.holding());
        let i = self
            .returns
            .iter()
            .position(|r| *r == state.ret())
            .ok_or_else(not_found)?;
        let j = self
            .holdings
            .iter()
            .position(|h| *h == state.holding())
            .ok_or_else(not_found)?;
        Ok(i * self.holdings.len() + j)
    }

    fn action_ix(&self, action: f64) -> Result<usize> {
        self.actions
            .iter()
            .position(|a| *a == action)
            .ok_or_else(|| anyhow!("{} is not in the action space", action))
    }

    /// Action values of a state, in action order.
    pub fn q_values(&self, state: &State) -> Result<&[f64], RlfolioError> {
        let n = self.actions.len();
        let row = self.row(state)?;
        Ok(&self.values[row * n..(row + 1) * n])
    }

    /// Value of a state-action pair.
    pub fn value(&self, state: &State, action: f64) -> Result<f64> {
        Ok(self.q_values(state)?[self.action_ix(action)?])
    }

    fn argmax(qs: &[f64]) -> usize {
        let mut best = 0;
        for (i, q) in qs.iter().enumerate().skip(1) {
            if *q > qs[best] {
                best = i;
            }
        }
        best
    }

    /// Epsilon-greedy action.
    ///
    /// With probability `epsilon` a uniformly random trade, otherwise
    /// [`QTable::choose_greedy_action`].
    pub fn choose_action(&mut self, state: &State, epsilon: f64) -> Result<f64> {
        if self.rng.gen::<f64>() < epsilon {
            let ix = self.rng.gen_range(0..self.actions.len());
            Ok(self.actions[ix])
        } else {
            self.choose_greedy_action(state)
        }
    }

    /// Trade with the largest value, the first one in action order on ties.
    pub fn choose_greedy_action(&self, state: &State) -> Result<f64> {
        let qs = self.q_values(state)?;
        Ok(self.actions[Self::argmax(qs)])
    }

    /// One-step TD update `Q += lr * (reward + gamma * max Q(next) - Q)`.
    pub fn update(
        &mut self,
        curr: &State,
        next: &State,
        action: f64,
        result: &TrackResult,
    ) -> Result<()> {
        let max_next = self
            .q_values(next)?
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let ix = self.row(curr)? * self.actions.len() + self.action_ix(action)?;
        let q = self.values[ix];
        self.values[ix] = q + self.lr * (result.reward() + self.gamma * max_next - q);
        Ok(())
    }

    /// Saves the table as `QTable<n_train>.zip` under `dir`.
    ///
    /// The CSV inside has the columns `Return`, `Holding` and one per action.
    pub fn save(&self, dir: impl AsRef<Path>, n_train: usize) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("QTable{}.zip", format_thousands(n_train)));

        let mut header = vec!["Return".to_string(), "Holding".to_string()];
        header.extend(self.actions.iter().map(|a| format!("{}", a)));

        let n = self.actions.len();
        let mut rows = Vec::with_capacity(self.values.len() / n);
        for (i, r) in self.returns.iter().enumerate() {
            for (j, h) in self.holdings.iter().enumerate() {
                let row = i * self.holdings.len() + j;
                let mut line = vec![*r, *h];
                line.extend_from_slice(&self.values[row * n..(row + 1) * n]);
                rows.push(line);
            }
        }
        util::write_csv_zip(&path, &header, &rows)?;
        info!("Saved Q-table to {:?}", path);

        Ok(path)
    }

    /// Loads a table written by [`QTable::save`].
    pub fn load(path: impl AsRef<Path>, config: &QTableConfig) -> Result<Self> {
        let (header, rows) = util::read_csv_zip(path.as_ref())?;
        if header.len() < 3 {
            return Err(anyhow!("Q-table file without action columns"));
        }
        let actions = header[2..]
            .iter()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut returns: Vec<f64> = vec![];
        let mut holdings: Vec<f64> = vec![];
        let mut values = Vec::with_capacity(rows.len() * actions.len());
        for row in rows.iter() {
            if row.len() != actions.len() + 2 {
                return Err(anyhow!("Q-table row of {} values", row.len()));
            }
            if !returns.contains(&row[0]) {
                returns.push(row[0]);
            }
            if !holdings.contains(&row[1]) {
                holdings.push(row[1]);
            }
            values.extend_from_slice(&row[2..]);
        }
        if returns.len() * holdings.len() != rows.len() {
            return Err(anyhow!("Q-table rows are not a return-holding grid"));
        }

        Ok(Self {
            returns,
            holdings,
            actions,
            values,
            lr: config.lr,
            gamma: config.gamma,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{MarketEnv, MarketEnvConfig},
        series::MarketSeries,
    };
    use tempdir::TempDir;

    fn env() -> MarketEnv {
        let config = MarketEnvConfig::default()
            .sigma(0.1)
            .kappa(1.0)
            .cost_multiplier(1.0)
            .f_param(vec![1.0])
            .klm([2.0, 1.0, 4.0])
            .ret_grid(2, 0.01);
        let returns = vec![0.0, 0.01, -0.02, 0.02];
        let factors = vec![vec![0.0]; 4];
        let series = MarketSeries::new(returns, factors, vec![5.0]).unwrap();
        MarketEnv::build(config, series).unwrap()
    }

    fn table(env: &MarketEnv, config: &QTableConfig) -> QTable {
        QTable::new(
            env.return_space(),
            env.holding_space(),
            env.action_space(),
            config,
        )
    }

    #[test]
    fn test_zero_action_is_default() -> Result<()> {
        let env = env();
        let qtable = table(&env, &QTableConfig::default());
        let state = env.discrete_reset();

        assert_eq!(qtable.choose_greedy_action(&state)?, 0.0);
        assert_eq!(qtable.value(&state, 0.0)?, 1e-10);
        assert_eq!(qtable.value(&state, 1.0)?, 0.0);
        Ok(())
    }

    #[test]
    fn test_update_moves_by_lr_fraction() -> Result<()> {
        let env = env();
        let config = QTableConfig::default().lr(0.25).gamma(0.5);
        let mut qtable = table(&env, &config);

        let curr = env.discrete_reset();
        let (next, result) = env.discrete_step(&curr, 1.0, 0);
        let before = qtable.value(&curr, 1.0)?;
        let target = result.reward() + 0.5 * 1e-10;
        qtable.update(&curr, &next, 1.0, &result)?;
        let after = qtable.value(&curr, 1.0)?;

        assert_eq!(after, before + 0.25 * (target - before));
        assert!((target - after).abs() < (target - before).abs());
        Ok(())
    }

    #[test]
    fn test_unknown_state() {
        let env = env();
        let qtable = table(&env, &QTableConfig::default());
        let err = qtable.q_values(&State::flat(0.013, 0.0)).unwrap_err();
        assert_eq!(err, RlfolioError::StateNotFound(0.013, 0.0));
    }

    #[test]
    fn test_greedy_after_learning() -> Result<()> {
        let env = env();
        let mut qtable = table(&env, &QTableConfig::default().lr(1.0).gamma(0.0));
        let curr = env.discrete_reset();

        // Shorting ahead of a negative return pays, the zero trade loses the argmax
        let (next, result) = env.discrete_step(&curr, -1.0, 1);
        assert!(result.reward() > 0.0);
        qtable.update(&curr, &next, -1.0, &result)?;
        assert_eq!(qtable.choose_greedy_action(&curr)?, -1.0);

        assert_eq!(qtable.choose_action(&curr, 0.0)?, -1.0);
        for _ in 0..20 {
            assert!(env.action_space().contains(qtable.choose_action(&curr, 1.0)?));
        }
        Ok(())
    }

    #[test]
    fn test_save_load_bit_exact() -> Result<()> {
        let env = env();
        let config = QTableConfig::default().lr(0.37);
        let mut qtable = table(&env, &config);
        let mut state = env.discrete_reset();
        for t in 0..3 {
            let action = qtable.choose_action(&state, 0.8)?;
            let (next, result) = env.discrete_step(&state, action, t);
            qtable.update(&state, &next, action, &result)?;
            state = next;
        }

        let dir = TempDir::new("qtable")?;
        let path = qtable.save(dir.path(), 1_000)?;
        assert_eq!(path, dir.path().join("QTable1k.zip"));

        let loaded = QTable::load(&path, &config)?;
        assert_eq!(loaded.returns, qtable.returns);
        assert_eq!(loaded.holdings, qtable.holdings);
        assert_eq!(loaded.actions, qtable.actions);
        for (a, b) in loaded.values.iter().zip(qtable.values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        Ok(())
    }
}
