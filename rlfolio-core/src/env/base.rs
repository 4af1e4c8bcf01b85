use super::{
    MarketEnvConfig, PolicyTag, ResultTable, RewardBreakdown, State, StateRepr, TrackResult,
};
use crate::{
    error::RlfolioError,
    series::MarketSeries,
    spaces::{ActionSpace, DiscreteSpace, HoldingSpace, ReturnSpace},
    util::format_thousands,
};
use anyhow::Result;
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// State of the GP and MV benchmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct OptState {
    /// Current return.
    pub ret: f64,

    /// Current factors.
    pub factors: Vec<f64>,

    /// Current holding.
    pub holding: f64,
}

/// Kind of result file written by [`MarketEnv::save_outputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `Results_<n_train>.zip`.
    Train,

    /// `TestResults_<n_train>_iteration_<iteration>.zip`.
    Test {
        /// Episode or iteration at which the test was run.
        iteration: usize,
    },
}

/// Single-asset market with quadratic trading costs.
///
/// All tracks (learned policies, tabular agent, GP and MV benchmarks) share the
/// reward formulas
///
/// ```text
/// gross_pnl = next_holding * return[t + 1]
/// risk      = 0.5 * kappa * next_holding^2 * sigma^2
/// cost      = 0.5 * action^2 * cost_multiplier * sigma^2
/// net_pnl   = gross_pnl - cost
/// reward    = gross_pnl - risk - cost
/// ```
///
/// and differ only in how the next holding is obtained. Stepping methods are
/// pure; the result table is mutated only by [`MarketEnv::store_results`].
///
/// Stepping at `t` reads index `t + 1` of the series, so the caller bounds
/// `t` by `len() - 2`. Indexing past the end panics.
pub struct MarketEnv {
    config: MarketEnvConfig,
    series: MarketSeries,
    window_head: Vec<f64>,
    action_space: ActionSpace,
    return_space: ReturnSpace,
    holding_space: HoldingSpace,
    results: ResultTable,
}

impl MarketEnv {
    /// Builds the environment on a series.
    ///
    /// With a window of `n` rows, the first `n - 1` elements of the series only
    /// fill the initial window: time index `0` is element `n - 1` of the series.
    pub fn build(config: MarketEnvConfig, series: MarketSeries) -> Result<Self> {
        config.validate()?;
        if config.f_param.len() != series.half_lives().len() {
            return Err(RlfolioError::InvalidConfig(format!(
                "{} factor loadings for {} factors",
                config.f_param.len(),
                series.half_lives().len()
            ))
            .into());
        }
        let n_rows = config.state_repr.n_rows();
        if series.len() < n_rows + 1 {
            return Err(RlfolioError::SeriesShape(format!(
                "a series of {} elements cannot fill a window of {} and step once",
                series.len(),
                n_rows
            ))
            .into());
        }

        let window_head = series.returns()[..n_rows].to_vec();
        let series = series.skip(n_rows - 1);
        let action_space = ActionSpace::new(config.klm[0], config.klm[1], config.zero_action)?;
        let holding_space = HoldingSpace::new(config.klm[2], config.klm[1])?;
        let return_space = ReturnSpace::new(config.ret_ticks, config.ret_tick)?;
        let results = ResultTable::new(&series);
        debug!(
            "Built market env: {} steps, {} actions, state {:?}",
            series.len(),
            action_space.len(),
            config.state_repr
        );

        Ok(Self {
            config,
            series,
            window_head,
            action_space,
            return_space,
            holding_space,
            results,
        })
    }

    /// Configuration of the environment.
    pub fn config(&self) -> &MarketEnvConfig {
        &self.config
    }

    /// Number of time indices.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Always `false`.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Returns aligned with the time indices.
    pub fn returns(&self) -> &[f64] {
        self.series.returns()
    }

    /// Factor rows aligned with the time indices.
    pub fn factors(&self) -> &[Vec<f64>] {
        self.series.factors()
    }

    /// Trades available to discrete policies.
    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// Discretized returns of the tabular agent.
    pub fn return_space(&self) -> &ReturnSpace {
        &self.return_space
    }

    /// Discretized holdings of the tabular agent.
    pub fn holding_space(&self) -> &HoldingSpace {
        &self.holding_space
    }

    /// Length of the flattened state, the input dimension of the networks.
    pub fn state_dim(&self) -> usize {
        2 * self.config.state_repr.n_rows()
    }

    /// Result table.
    pub fn results(&self) -> &ResultTable {
        &self.results
    }

    /// Replaces the result table with one holding only the series columns.
    pub fn clear_results(&mut self) {
        self.results = ResultTable::new(&self.series);
    }

    fn breakdown(&self, curr_holding: f64, next_holding: f64, next_ret: f64) -> RewardBreakdown {
        let c = &self.config;
        let sigma2 = c.sigma * c.sigma;
        let action = next_holding - curr_holding;
        let gross_pnl = next_holding * next_ret;
        let risk = 0.5 * c.kappa * ((next_holding * next_holding) * sigma2);
        let cost = 0.5 * (action * action) * (c.cost_multiplier * sigma2);
        let net_pnl = gross_pnl - cost;
        let reward = gross_pnl - risk - cost;

        RewardBreakdown {
            curr_holding,
            next_holding,
            action,
            gross_pnl,
            net_pnl,
            risk,
            cost,
            reward,
        }
    }

    /// Initial state and factors.
    ///
    /// A window starts with the first returns of the series and zero holdings.
    pub fn reset(&self) -> (State, &[f64]) {
        let state = match self.config.state_repr {
            StateRepr::Flat => State::flat(self.returns()[0], self.config.start_holding),
            StateRepr::Window(_) => State::window(
                self.window_head
                    .iter()
                    .map(|r| [*r, 0.0]),
            ),
        };
        (state, self.factors()[0].as_slice())
    }

    /// Trades `action` shares at time `t`.
    ///
    /// Returns the next state, the reward tagged by `tag` and the factors at `t + 1`.
    pub fn step(
        &self,
        state: &State,
        action: f64,
        t: usize,
        tag: PolicyTag,
    ) -> (State, TrackResult, &[f64]) {
        let next_ret = self.returns()[t + 1];
        let next_holding = state.holding() + action;
        let next_state = state.shift(next_ret, next_holding);
        let breakdown = self.breakdown(state.holding(), next_holding, next_ret);

        (
            next_state,
            TrackResult::new(tag, breakdown),
            self.factors()[t + 1].as_slice(),
        )
    }

    /// Initial state of the tabular agent, snapped to the discretized spaces.
    pub fn discrete_reset(&self) -> State {
        State::flat(
            self.return_space.nearest(self.returns()[0]),
            self.holding_space.nearest(self.config.start_holding),
        )
    }

    /// Step of the tabular agent, tagged [`PolicyTag::Q`].
    ///
    /// The next return and holding are snapped to the discretized spaces
    /// before the reward is computed.
    pub fn discrete_step(&self, state: &State, action: f64, t: usize) -> (State, TrackResult) {
        let next_ret = self.return_space.nearest(self.returns()[t + 1]);
        let next_holding = self.holding_space.nearest(state.holding() + action);
        let breakdown = self.breakdown(state.holding(), next_holding, next_ret);

        (
            State::flat(next_ret, next_holding),
            TrackResult::new(PolicyTag::Q, breakdown),
        )
    }

    /// Initial state of the benchmarks.
    pub fn opt_reset(&self) -> OptState {
        OptState {
            ret: self.returns()[0],
            factors: self.factors()[0].clone(),
            holding: self.config.start_holding,
        }
    }

    fn myopic_target(&self, loads: &[f64], factors: &[f64]) -> f64 {
        let c = &self.config;
        let exposure: f64 = loads.iter().zip(factors.iter()).map(|(l, f)| l * f).sum();
        (1.0 / (c.kappa * (c.sigma * c.sigma))) * exposure
    }

    /// Step of the optimal-tracking benchmark, tagged [`PolicyTag::Gp`].
    ///
    /// The holding moves a fraction `opt_rate` of the way to the target
    /// aimed at by the discounted factor loadings.
    pub fn opt_step(
        &self,
        state: &OptState,
        opt_rate: f64,
        disc_loads: &[f64],
        t: usize,
    ) -> (OptState, TrackResult) {
        let c = &self.config;
        let exposure: f64 = disc_loads
            .iter()
            .zip(state.factors.iter())
            .map(|(l, f)| l * f)
            .sum();
        let next_holding = (1.0 - opt_rate) * state.holding
            + opt_rate * (1.0 / (c.kappa * (c.sigma * c.sigma))) * exposure;

        self.bench_step(state, next_holding, t, PolicyTag::Gp)
    }

    /// Step of the Markowitz benchmark, tagged [`PolicyTag::Mv`].
    ///
    /// The holding jumps to the myopic mean-variance target, ignoring costs.
    pub fn mv_step(&self, state: &OptState, t: usize) -> (OptState, TrackResult) {
        let next_holding = self.myopic_target(&self.config.f_param, &state.factors);
        self.bench_step(state, next_holding, t, PolicyTag::Mv)
    }

    fn bench_step(
        &self,
        state: &OptState,
        next_holding: f64,
        t: usize,
        tag: PolicyTag,
    ) -> (OptState, TrackResult) {
        let next_ret = self.returns()[t + 1];
        let breakdown = self.breakdown(state.holding, next_holding, next_ret);
        let next_state = OptState {
            ret: next_ret,
            factors: self.factors()[t + 1].clone(),
            holding: next_holding,
        };
        (next_state, TrackResult::new(tag, breakdown))
    }

    /// Trading rate and discounted factor loadings of the optimal-tracking benchmark.
    ///
    /// With `rho = 1 - exp(-discount_rate / 260)` the rate is the positive root
    /// of the discrete-time linear-quadratic tracking problem.
    pub fn opt_trading_rate_disc_loads(&self) -> (f64, Vec<f64>) {
        let c = &self.config;
        let rho = 1.0 - (-c.discount_rate / 260.0).exp();

        let num1 = c.kappa * (1.0 - rho) + c.cost_multiplier * rho;
        let num2 =
            (num1 * num1 + 4.0 * c.kappa * c.cost_multiplier * ((1.0 - rho) * (1.0 - rho))).sqrt();
        let den = 2.0 * (1.0 - rho);
        let a = (-num1 + num2) / den;
        let opt_rate = a / c.cost_multiplier;

        let disc_loads = c
            .f_param
            .iter()
            .zip(self.series.f_speed().iter())
            .map(|(f, speed)| f / (1.0 + speed * ((opt_rate * c.cost_multiplier) / c.kappa)))
            .collect();

        (opt_rate, disc_loads)
    }

    /// Writes the metrics of a step at row `t` of the result table.
    pub fn store_results(&mut self, result: &TrackResult, t: usize) {
        for (k, v) in result.entries() {
            self.results.set(&k, t, v);
        }
    }

    /// Saves the result table under `dir` and returns the path of the file.
    pub fn save_outputs(&self, dir: impl AsRef<Path>, kind: OutputKind) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let n = format_thousands(self.config.n_train);
        let name = match kind {
            OutputKind::Train => format!("Results_{}.zip", n),
            OutputKind::Test { iteration } => {
                format!("TestResults_{}_iteration_{}.zip", n, iteration)
            }
        };
        let path = dir.join(name);
        self.results.save(&path)?;
        debug!("Saved results to {:?}", path);
        Ok(path)
    }
}
