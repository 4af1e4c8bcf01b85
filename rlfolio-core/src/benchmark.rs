//! Run the tabular, off-policy and benchmark tracks side by side.
mod config;
use crate::{
    env::{MarketEnv, OutputKind, PolicyTag},
    error::RlfolioError,
    evaluator::Evaluator,
    qtable::QTable,
    record::{Record, RecordValue::Scalar, Recorder},
    util, Experience, OffPolicyAgent,
};
use anyhow::Result;
pub use config::BenchmarkConfig;
use log::{debug, info, trace};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Drives up to four tracks on one series with a shared iteration index.
///
/// With `N = n_train` of the environment, iterations `i = 0..=N` each step
/// every enabled track once:
///
/// * DRL: epsilon-greedy trade of the off-policy agent, environment step
///   tagged `DQN`, experience pushed into the agent, optimization step.
/// * Q: epsilon-greedy trade of the Q-table, discrete step, TD update.
/// * GP: optimal-tracking step.
/// * MV: Markowitz step.
///
/// The metrics of every step are written into the result table of the
/// environment. Before each iteration the exploration rate decays linearly,
/// `epsilon = max(min_eps, epsilon - (epsilon_0 - min_eps) / int(N * min_eps_pct))`.
///
/// With `save_ckpt_model = k > 0`, every `N / k` iterations the Q-table and,
/// once warmed up, the agent parameters are saved under `(out_dir)/ckpt`
/// (`QTable<i>.zip`, `DQN_<i>_it_weights`), then the evaluator runs.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    shutdown: Option<Arc<AtomicBool>>,
}

impl BenchmarkRunner {
    /// Constructs a runner.
    pub fn build(config: BenchmarkConfig) -> Self {
        Self {
            config,
            shutdown: None,
        }
    }

    /// Sets a flag which stops the loop after the current iteration when raised.
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn is_interrupted(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Linear decrement of the exploration rate for `n_train` iterations.
    pub fn eps_decay(&self, n_train: usize) -> Result<f64> {
        let c = &self.config;
        let steps_to_min_eps = (n_train as f64 * c.min_eps_pct) as usize;
        if steps_to_min_eps == 0 {
            return Err(RlfolioError::InvalidConfig(format!(
                "min_eps_pct = {} reaches the final epsilon in 0 of {} iterations",
                c.min_eps_pct, n_train
            ))
            .into());
        }
        Ok((c.epsilon - c.min_eps) / steps_to_min_eps as f64)
    }

    /// Path of the agent checkpoint at iteration `iter`.
    pub fn checkpoint_path(out_dir: &Path, iter: usize) -> PathBuf {
        out_dir.join("ckpt").join(format!("DQN_{}_it_weights", iter))
    }

    fn out_dir(&self) -> Option<PathBuf> {
        self.config.out_dir.as_ref().map(PathBuf::from)
    }

    fn save_checkpoint(
        &self,
        iter: usize,
        agent: Option<&(dyn OffPolicyAgent + 'static)>,
        warmed_up: bool,
        qtable: Option<&QTable>,
    ) -> Result<()> {
        let out_dir = match self.out_dir() {
            Some(dir) => dir,
            None => return Ok(()),
        };
        if let (Some(agent), true) = (agent, warmed_up) {
            let path = Self::checkpoint_path(&out_dir, iter);
            util::save_dir_atomically(&path, |tmp| agent.save_params(tmp))?;
            info!("Saved the model in {:?}.", &path);
        }
        if let Some(qtable) = qtable {
            qtable.save(out_dir.join("ckpt"), iter)?;
        }
        Ok(())
    }

    fn save_final(
        &self,
        env: &MarketEnv,
        agent: Option<&(dyn OffPolicyAgent + 'static)>,
        qtable: Option<&QTable>,
    ) -> Result<()> {
        let c = &self.config;
        let out_dir = match self.out_dir() {
            Some(dir) => dir,
            None => return Ok(()),
        };
        if c.save_results {
            let path = env.save_outputs(&out_dir, OutputKind::Train)?;
            info!("Saved results in {:?}", path);
        }
        if let (true, Some(qtable)) = (c.save_table, qtable) {
            qtable.save(&out_dir, env.config().n_train)?;
        }
        if let (true, Some(agent)) = (c.save_model, agent) {
            let path = out_dir.join("DQN_final_weights");
            util::save_dir_atomically(&path, |tmp| agent.save_params(tmp))?;
            info!("Saved the model in {:?}.", &path);
        }
        Ok(())
    }

    /// Runs the enabled tracks.
    ///
    /// `agent` is required when the DRL track is enabled. The Q-table is built
    /// on the discretized spaces of the environment and returned when the
    /// tabular track is enabled.
    pub fn run(
        &self,
        env: &mut MarketEnv,
        mut agent: Option<&mut (dyn OffPolicyAgent + 'static)>,
        recorder: &mut dyn Recorder,
        mut evaluator: Option<&mut dyn Evaluator<dyn OffPolicyAgent>>,
    ) -> Result<Option<QTable>> {
        let c = &self.config;
        let n_train = env.config().n_train;
        if env.len() < n_train + 2 {
            return Err(RlfolioError::SeriesShape(format!(
                "{} iterations need {} time indices, got {}",
                n_train + 1,
                n_train + 2,
                env.len()
            ))
            .into());
        }
        if c.execute_drl && agent.is_none() {
            return Err(RlfolioError::InvalidConfig(
                "the DRL track is enabled without an agent".to_string(),
            )
            .into());
        }
        if !c.execute_drl {
            agent = None;
        }
        let eps_decay = self.eps_decay(n_train)?;
        let ckpt_steps = match c.save_ckpt_model {
            0 => None,
            k => Some((n_train / k).max(1)),
        };

        let mut qtable = match c.execute_q {
            true => Some(QTable::new(
                env.return_space(),
                env.holding_space(),
                env.action_space(),
                &c.qtable,
            )),
            false => None,
        };
        let (opt_rate, disc_loads) = env.opt_trading_rate_disc_loads();
        let (mut state, _) = env.reset();
        let mut discr_state = env.discrete_reset();
        let mut opt_state = env.opt_reset();
        let mut mv_state = env.opt_reset();
        let mut epsilon = c.epsilon;
        let mut warmed_up = false;
        info!(
            "Starts benchmark run: {} iterations, drl = {}, q = {}, gp = {}, mv = {}",
            n_train + 1,
            c.execute_drl,
            c.execute_q,
            c.execute_gp,
            c.execute_mv
        );

        for i in 0..=n_train {
            if self.is_interrupted() {
                info!("Interrupted at iteration {}", i);
                break;
            }
            epsilon = c.min_eps.max(epsilon - eps_decay);
            let mut record = Record::from_scalar("epsilon", epsilon as f32);

            if let Some(agent) = agent.as_mut() {
                let trade = agent.eps_greedy(&state, epsilon)?;
                let (next_state, result, _) = env.step(&state, trade, i, PolicyTag::Dqn);
                env.store_results(&result, i);
                record.insert(result.tag().reward_key(), Scalar(result.reward() as f32));

                agent.push(Experience {
                    state: state.to_vec(),
                    trade,
                    reward: result.reward(),
                    next_state: next_state.to_vec(),
                })?;
                if let Some(record_agent) = agent.opt(i)? {
                    warmed_up = true;
                    record.merge_inplace(record_agent);
                }
                state = next_state;
            }

            if let Some(qtable) = qtable.as_mut() {
                let trade = qtable.choose_action(&discr_state, epsilon)?;
                let (next_state, result) = env.discrete_step(&discr_state, trade, i);
                env.store_results(&result, i);
                qtable.update(&discr_state, &next_state, trade, &result)?;
                record.insert(result.tag().reward_key(), Scalar(result.reward() as f32));
                discr_state = next_state;
            }

            if c.execute_gp {
                let (next_state, result) = env.opt_step(&opt_state, opt_rate, &disc_loads, i);
                env.store_results(&result, i);
                record.insert(result.tag().reward_key(), Scalar(result.reward() as f32));
                opt_state = next_state;
            }

            if c.execute_mv {
                let (next_state, result) = env.mv_step(&mv_state, i);
                env.store_results(&result, i);
                record.insert(result.tag().reward_key(), Scalar(result.reward() as f32));
                mv_state = next_state;
            }

            trace!("Iteration {}: {:?}", i, record);
            recorder.store(record);

            if let Some(steps) = ckpt_steps {
                if i > 0 && i % steps == 0 {
                    debug!("Checkpoint at iteration {}", i);
                    self.save_checkpoint(i, agent.as_deref(), warmed_up, qtable.as_ref())?;
                    if let (Some(agent), Some(evaluator), true) =
                        (agent.as_mut(), evaluator.as_mut(), warmed_up)
                    {
                        let record = evaluator.evaluate(&mut **agent, i)?;
                        recorder.write(record);
                    }
                }
            }

            if (i + 1) % c.flush_record_interval.max(1) == 0 {
                recorder.flush(i as i64);
            }
        }
        recorder.flush(n_train as i64);
        info!("Finished benchmark run");

        self.save_final(env, agent.as_deref(), qtable.as_ref())?;
        Ok(qtable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{MarketEnvConfig, ResultTable, State},
        qtable::QTableConfig,
        record::BufferedRecorder,
        series::MarketSeries,
        spaces::DiscreteSpace,
        Policy,
    };
    use tempdir::TempDir;

    #[derive(Default)]
    struct StubAgent {
        pushed: Vec<Experience>,
        n_opts: usize,
        epsilons: Vec<f64>,
    }

    impl Policy for StubAgent {
        fn sample(&mut self, _state: &State) -> Result<f64> {
            Ok(0.0)
        }
    }

    impl OffPolicyAgent for StubAgent {
        fn eps_greedy(&mut self, _state: &State, epsilon: f64) -> Result<f64> {
            self.epsilons.push(epsilon);
            Ok(1.0)
        }

        fn push(&mut self, experience: Experience) -> Result<()> {
            self.pushed.push(experience);
            Ok(())
        }

        fn opt(&mut self, iter: usize) -> Result<Option<Record>> {
            if iter < 3 {
                return Ok(None);
            }
            self.n_opts += 1;
            Ok(Some(Record::from_scalar("loss", 1.0)))
        }

        fn save_params(&self, path: &Path) -> Result<()> {
            std::fs::write(path.join("params.txt"), format!("{}", self.n_opts))?;
            Ok(())
        }

        fn load_params(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct CountingEvaluator(Vec<usize>);

    impl Evaluator<dyn OffPolicyAgent> for CountingEvaluator {
        fn evaluate(
            &mut self,
            policy: &mut (dyn OffPolicyAgent + 'static),
            iteration: usize,
        ) -> Result<Record> {
            self.0.push(iteration);
            Ok(Record::from_scalar("eval_reward", policy.sample(&State::flat(0.0, 0.0))? as f32))
        }
    }

    fn env(n_train: usize) -> MarketEnv {
        let config = MarketEnvConfig::default()
            .sigma(0.1)
            .kappa(1.0)
            .cost_multiplier(1.0)
            .discount_rate(0.02)
            .f_param(vec![0.5])
            .klm([2.0, 1.0, 4.0])
            .ret_grid(2, 0.01)
            .n_train(n_train);
        let returns: Vec<f64> = (0..n_train + 2)
            .map(|i| 0.01 * ((i % 5) as f64 - 2.0))
            .collect();
        let factors = returns.iter().map(|r| vec![10.0 * r]).collect();
        MarketEnv::build(config, MarketSeries::new(returns, factors, vec![5.0]).unwrap()).unwrap()
    }

    #[test]
    fn test_benchmark_tracks() -> Result<()> {
        let dir = TempDir::new("benchmark")?;
        let config = BenchmarkConfig::default()
            .min_eps_pct(0.5)
            .qtable(QTableConfig::default().seed(7))
            .out_dir(dir.path().to_str().unwrap());
        let runner = BenchmarkRunner::build(config);
        let mut env = env(20);
        let mut recorder = BufferedRecorder::new();

        let qtable = runner.run(&mut env, None, &mut recorder, None)?;
        assert!(qtable.is_some());

        let table = ResultTable::load(&dir.path().join("Results_20.zip"))?;
        assert_eq!(table.n_rows(), 22);
        for key in ["Reward_Q", "GPReward", "MVReward", "NextHolding_Q"] {
            assert!(table.column(key).is_some(), "{}", key);
        }
        assert!(table.column("Reward_DQN").is_none());
        assert!(dir.path().join("QTable20.zip").exists());
        assert!(!dir.path().join("DQN_final_weights").exists());

        // Holdings of the tabular track stay on the grid
        let holdings = table.column("NextHolding_Q").unwrap();
        assert!(holdings
            .iter()
            .all(|h| env.holding_space().values().contains(h)));
        Ok(())
    }

    #[test]
    fn test_epsilon_decay_and_checkpoints() -> Result<()> {
        let dir = TempDir::new("benchmark_drl")?;
        let config = BenchmarkConfig::default()
            .epsilon(1.0)
            .min_eps(0.2)
            .min_eps_pct(0.4)
            .tracks(true, true, false, false)
            .save_ckpt_model(5)
            .out_dir(dir.path().to_str().unwrap());
        let runner = BenchmarkRunner::build(config);
        let mut env = env(10);
        let mut agent = StubAgent::default();
        let mut recorder = BufferedRecorder::new();
        let mut evaluator = CountingEvaluator(vec![]);

        runner.run(&mut env, Some(&mut agent), &mut recorder, Some(&mut evaluator))?;

        assert_eq!(agent.pushed.len(), 11);
        assert_eq!(agent.pushed[0].next_state, agent.pushed[1].state);
        // (1.0 - 0.2) / int(10 * 0.4) = 0.2 per iteration
        assert!((agent.epsilons[0] - 0.8).abs() < 1e-12);
        assert!((agent.epsilons[2] - 0.4).abs() < 1e-12);
        assert!((agent.epsilons[3] - 0.2).abs() < 1e-12);
        assert_eq!(agent.epsilons[4], 0.2);
        assert_eq!(agent.epsilons[10], 0.2);

        // Checkpoints every 2 iterations once the agent is warmed up
        assert!(!BenchmarkRunner::checkpoint_path(dir.path(), 2).exists());
        assert!(BenchmarkRunner::checkpoint_path(dir.path(), 4).exists());
        assert!(BenchmarkRunner::checkpoint_path(dir.path(), 10).exists());
        assert!(dir.path().join("ckpt").join("QTable2.zip").exists());
        assert_eq!(evaluator.0, vec![4, 6, 8, 10]);
        assert!(dir.path().join("DQN_final_weights").join("params.txt").exists());
        Ok(())
    }

    #[test]
    fn test_drl_without_agent() {
        let config = BenchmarkConfig::default().tracks(true, false, true, true);
        let mut recorder = BufferedRecorder::new();
        let res = BenchmarkRunner::build(config).run(&mut env(10), None, &mut recorder, None);
        assert!(res.is_err());
    }

    #[test]
    fn test_short_series() {
        let mut env = env(10);
        let mut recorder = BufferedRecorder::new();
        let runner = BenchmarkRunner::build(BenchmarkConfig::default());
        // n_train of the env config exceeds the series
        let mut long = MarketEnv::build(
            env.config().clone().n_train(50),
            MarketSeries::new(env.returns().to_vec(), env.factors().to_vec(), vec![5.0]).unwrap(),
        )
        .unwrap();
        assert!(runner.run(&mut long, None, &mut recorder, None).is_err());
        assert!(runner.run(&mut env, None, &mut recorder, None).is_ok());
    }
}
