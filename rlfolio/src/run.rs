//! Seeded realizations of PPO training and benchmark runs.
use crate::RunConfig;
use anyhow::Result;
use log::{info, warn};
use rlfolio_candle_agent::{
    dqn::Dqn,
    ppo::{ActorCritic, Ppo},
};
use rlfolio_core::{
    env::{MarketEnv, OutputKind, PolicyTag, ResultTable},
    record::LogRecorder,
    series::MarketSeries,
    spaces::{ContinuousActionRange, DiscreteSpace, PolicyType},
    util, BenchmarkRunner, Configurable, Evaluator, OffPolicyAgent, OnPolicyAgent,
    OutOfSampleEvaluator, Trainer,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
    thread,
};

/// What a realization does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Trains a PPO agent over the episodes of the trainer.
    Ppo,

    /// Runs the tabular, DQN and benchmark tracks side by side.
    Benchmark,
}

/// Cumulative reward of each track of a realization.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Seed of the realization.
    pub seed: u64,

    /// Sum of the reward column of each track.
    pub rewards: Vec<(PolicyTag, f64)>,
}

impl RunSummary {
    fn new(seed: u64, results: &ResultTable, tags: &[PolicyTag]) -> Self {
        let rewards = tags
            .iter()
            .filter_map(|tag| {
                results
                    .column(&tag.reward_key())
                    .map(|c| (tag.clone(), c.iter().sum()))
            })
            .collect();
        Self { seed, rewards }
    }

    /// Cumulative reward of a track.
    pub fn reward(&self, tag: &PolicyTag) -> Option<f64> {
        self.rewards.iter().find(|(t, _)| t == tag).map(|(_, r)| *r)
    }
}

/// Runs realizations of one configuration under
/// `(out_dir)/(out_class)/(YYYYMMDD)_(model_name)/seed_(seed)`.
pub struct Runner {
    config: RunConfig,
    series: MarketSeries,
    test_series: Option<MarketSeries>,
    run_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl Runner {
    /// Constructs a runner writing under `out_dir`.
    pub fn new(config: RunConfig, series: MarketSeries, out_dir: impl AsRef<Path>) -> Self {
        let run_dir = out_dir.as_ref().join(&config.out_class).join(format!(
            "{}_{}",
            chrono::Local::now().format("%Y%m%d"),
            config.model_name
        ));
        Self {
            config,
            series,
            test_series: None,
            run_dir,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets a held-out series for out-of-sample evaluation at the checkpoints.
    pub fn test_series(mut self, series: MarketSeries) -> Self {
        self.test_series = Some(series);
        self
    }

    /// Sets a flag stopping every realization after its current step when raised.
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Directory of the run.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory of the realization with the given seed.
    pub fn seed_dir(&self, seed: u64) -> PathBuf {
        self.run_dir.join(format!("seed_{}", seed))
    }

    fn evaluator(&self, tag: PolicyTag, dir: &Path) -> Result<Option<OutOfSampleEvaluator>> {
        match &self.test_series {
            Some(series) => {
                let env = MarketEnv::build(self.config.env.clone(), series.clone())?;
                Ok(Some(OutOfSampleEvaluator::new(env, tag).out_dir(dir)))
            }
            None => Ok(None),
        }
    }

    /// Trains PPO on the series with the given seed.
    ///
    /// A continuous policy without a configured range trades within the
    /// largest trade of the action space.
    pub fn run_ppo(&self, seed: u64) -> Result<RunSummary> {
        let c = &self.config;
        let dir = self.seed_dir(seed);
        fs::create_dir_all(&dir)?;

        let mut env = MarketEnv::build(c.env.clone(), self.series.clone())?;
        let ppo_config = {
            let config = c.ppo.clone().state_dim(env.state_dim()).seed(seed);
            match config.model.policy_type {
                PolicyType::Discrete => config.discrete(env.action_space()),
                PolicyType::Continuous => {
                    let range = match config.action_range {
                        Some(range) => range,
                        None => {
                            let bound = env
                                .action_space()
                                .values()
                                .iter()
                                .fold(0.0f64, |m, v| m.max(v.abs()));
                            ContinuousActionRange::symmetric(bound)?
                        }
                    };
                    config.continuous(range)
                }
            }
        };
        let mut agent = Ppo::<ActorCritic>::build(ppo_config)?;
        let trainer = Trainer::build(
            c.trainer.clone().model_dir(dir.to_string_lossy()),
            c.rollout.clone().seed(seed),
        )
        .shutdown_flag(self.shutdown.clone());
        let mut recorder = LogRecorder::new(format!("PPO seed {}", seed));
        let mut evaluator = self.evaluator(PolicyTag::Ppo, &dir)?;

        info!("Starts PPO training with seed {} in {:?}", seed, dir);
        trainer.train(
            &mut env,
            &mut agent,
            &mut recorder,
            evaluator
                .as_mut()
                .map(|e| e as &mut dyn Evaluator<Ppo<ActorCritic>>),
        )?;

        let path = dir.join("PPO_final_weights");
        util::save_dir_atomically(&path, |tmp| agent.save_params(tmp))?;
        env.save_outputs(&dir, OutputKind::Train)?;

        Ok(RunSummary::new(seed, env.results(), &[PolicyTag::Ppo]))
    }

    /// Runs the enabled benchmark tracks with the given seed.
    pub fn run_benchmark(&self, seed: u64) -> Result<RunSummary> {
        let c = &self.config;
        let dir = self.seed_dir(seed);
        fs::create_dir_all(&dir)?;

        let mut env = MarketEnv::build(c.env.clone(), self.series.clone())?;
        let bench_config = c
            .benchmark
            .clone()
            .out_dir(dir.to_string_lossy())
            .qtable(c.benchmark.qtable.clone().seed(seed));
        let mut agent = match c.benchmark.execute_drl {
            true => {
                let mut config = c
                    .dqn
                    .clone()
                    .state_dim(env.state_dim())
                    .action_space(env.action_space())
                    .seed(seed);
                if let Some(pct) = c.max_exp_pct {
                    config = config.max_exp_pct(c.env.n_train, pct);
                }
                Some(Dqn::build(config)?)
            }
            false => None,
        };
        let mut evaluator = match agent.is_some() {
            true => self.evaluator(PolicyTag::Dqn, &dir)?,
            false => None,
        };
        let runner = BenchmarkRunner::build(bench_config).shutdown_flag(self.shutdown.clone());
        let mut recorder = LogRecorder::new(format!("benchmark seed {}", seed));

        info!("Starts benchmark run with seed {} in {:?}", seed, dir);
        runner.run(
            &mut env,
            agent
                .as_mut()
                .map(|a| a as &mut (dyn OffPolicyAgent + 'static)),
            &mut recorder,
            evaluator
                .as_mut()
                .map(|e| e as &mut dyn Evaluator<dyn OffPolicyAgent>),
        )?;

        let b = &c.benchmark;
        let tags: Vec<PolicyTag> = [
            (b.execute_drl, PolicyTag::Dqn),
            (b.execute_q, PolicyTag::Q),
            (b.execute_gp, PolicyTag::Gp),
            (b.execute_mv, PolicyTag::Mv),
        ]
        .into_iter()
        .filter_map(|(on, tag)| on.then_some(tag))
        .collect();
        Ok(RunSummary::new(seed, env.results(), &tags))
    }

    /// Runs one realization per seed, each on its own thread.
    ///
    /// The configuration is saved as `config.yaml` in the run directory. The
    /// summaries come back in the order of `seeds`; the first failed
    /// realization is returned as the error once all threads have finished.
    pub fn run_ensemble(&self, command: Command, seeds: &[u64]) -> Result<Vec<RunSummary>> {
        fs::create_dir_all(&self.run_dir)?;
        self.config.save(self.run_dir.join("config.yaml"))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        thread::scope(|s| {
            for &seed in seeds {
                let tx = tx.clone();
                s.spawn(move || {
                    let result = match command {
                        Command::Ppo => self.run_ppo(seed),
                        Command::Benchmark => self.run_benchmark(seed),
                    };
                    if tx.send((seed, result)).is_err() {
                        warn!("Summary of seed {} dropped", seed);
                    }
                });
            }
        });
        drop(tx);

        let mut results: Vec<(u64, Result<RunSummary>)> = rx.iter().collect();
        results.sort_by_key(|(seed, _)| seeds.iter().position(|s| s == seed));

        let mut summaries = vec![];
        let mut first_err = None;
        for (seed, result) in results {
            match result {
                Ok(summary) => {
                    for (tag, reward) in summary.rewards.iter() {
                        info!("seed {}: cumulative {} {:.6}", seed, tag.reward_key(), reward);
                    }
                    summaries.push(summary);
                }
                Err(e) => {
                    warn!("Realization with seed {} failed: {:#}", seed, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e.context(format!(
                "{} of {} realizations failed",
                seeds.len() - summaries.len(),
                seeds.len()
            ))),
            None => Ok(summaries),
        }
    }
}
