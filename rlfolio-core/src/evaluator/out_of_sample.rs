//! Out-of-sample comparison against the optimal-tracking benchmark.
use super::Evaluator;
use crate::{
    env::{MarketEnv, OutputKind, PolicyTag},
    record::{Record, RecordValue::Scalar},
    Policy,
};
use anyhow::Result;
use log::info;
use std::path::PathBuf;

/// Runs a policy on a held-out series next to the GP benchmark.
///
/// The returned record holds the cumulative reward and net P&L of the policy
/// (`eval_reward`, `eval_net_pnl`), the same for the benchmark
/// (`gp_reward`, `gp_net_pnl`) and `reward_ratio = eval_reward / gp_reward`.
///
/// The result table of the test environment is rebuilt at every evaluation and,
/// when an output directory is set, saved as
/// `TestResults_<n_train>_iteration_<iteration>.zip`.
pub struct OutOfSampleEvaluator {
    env: MarketEnv,
    tag: PolicyTag,
    out_dir: Option<PathBuf>,
    opt_rate: f64,
    disc_loads: Vec<f64>,
}

impl OutOfSampleEvaluator {
    /// Constructs the evaluator on a test environment.
    ///
    /// `tag` names the metric columns of the evaluated policy.
    pub fn new(env: MarketEnv, tag: PolicyTag) -> Self {
        let (opt_rate, disc_loads) = env.opt_trading_rate_disc_loads();
        Self {
            env,
            tag,
            out_dir: None,
            opt_rate,
            disc_loads,
        }
    }

    /// Sets the directory where the result tables are saved.
    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(dir.into());
        self
    }

    /// The test environment.
    pub fn env(&self) -> &MarketEnv {
        &self.env
    }
}

impl<P: Policy + ?Sized> Evaluator<P> for OutOfSampleEvaluator {
    fn evaluate(&mut self, policy: &mut P, iteration: usize) -> Result<Record> {
        self.env.clear_results();
        let (mut state, _) = self.env.reset();
        let mut opt_state = self.env.opt_reset();
        let (mut reward, mut net_pnl) = (0.0, 0.0);
        let (mut gp_reward, mut gp_net_pnl) = (0.0, 0.0);

        for t in 0..self.env.len() - 1 {
            let trade = policy.sample(&state)?;
            let (next_state, result, _) = self.env.step(&state, trade, t, self.tag.clone());
            reward += result.reward();
            net_pnl += result.net_pnl();
            self.env.store_results(&result, t);
            state = next_state;

            let (next_opt_state, result) =
                self.env.opt_step(&opt_state, self.opt_rate, &self.disc_loads, t);
            gp_reward += result.reward();
            gp_net_pnl += result.net_pnl();
            self.env.store_results(&result, t);
            opt_state = next_opt_state;
        }

        if let Some(dir) = &self.out_dir {
            self.env.save_outputs(dir, OutputKind::Test { iteration })?;
        }

        let reward_ratio = reward / gp_reward;
        info!(
            "Out-of-sample test at iteration {}: reward {:.4}, GP reward {:.4}, ratio {:.4}",
            iteration, reward, gp_reward, reward_ratio
        );

        let mut record = Record::empty();
        record.insert("eval_reward", Scalar(reward as f32));
        record.insert("eval_net_pnl", Scalar(net_pnl as f32));
        record.insert("gp_reward", Scalar(gp_reward as f32));
        record.insert("gp_net_pnl", Scalar(gp_net_pnl as f32));
        record.insert("reward_ratio", Scalar(reward_ratio as f32));
        Ok(record)
    }
}
