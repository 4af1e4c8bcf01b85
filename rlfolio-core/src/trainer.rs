//! Train [`OnPolicyAgent`].
mod config;
use crate::{
    env::{MarketEnv, PolicyTag},
    error::RlfolioError,
    evaluator::Evaluator,
    record::{Record, RecordValue::Scalar, Recorder},
    rollout::{RolloutBuffer, RolloutBufferConfig, Transition},
    util, OnPolicyAgent,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::{debug, info, trace};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the training loop of an on-policy agent on [`MarketEnv`].
///
/// # Training loop
///
/// For each of the `episodes` episodes:
///
/// 1. *Collect a rollout*: reset the environment and the [`RolloutBuffer`],
///    then for `t` in `0..len - 2` let the agent act on the state, step the
///    environment with tag `PPO`, store the metrics of the step in the result
///    table of the environment and push the transition into the buffer.
/// 2. Compute the returns and advantages of the rollout, bootstrapping from the
///    value of the last next state.
/// 3. *Update*: for each of the `epochs` epochs, do an optimization step on
///    every minibatch of the buffer. Between two epochs (not after the last)
///    the values of the buffered states are re-estimated and the advantages
///    recomputed.
/// 4. If `save_freq > 0` and the number of finished episodes `ep` is a multiple
///    of it, save the parameters of the agent in `(model_dir)/ckpt/PPO_(ep)_ep_weights`
///    and run the evaluator, if any.
/// 5. Flush the losses stored during the update, with the episode as step.
///
/// The loop exits after the current step when the shutdown flag is raised.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[OnPolicyAgent]-->|trade|B[MarketEnv]
///     B -->|State, TrackResult|A
///     B -->|Transition|C[RolloutBuffer]
///     C -->|Minibatch|A
///     A -->|Record|D[Recorder]
/// ```
pub struct Trainer {
    /// Configuration of the rollout buffer.
    rollout_config: RolloutBufferConfig,

    /// The number of episodes.
    episodes: usize,

    /// The number of epochs per episode.
    epochs: usize,

    /// Interval of checkpointing and evaluation in episodes.
    save_freq: usize,

    /// Where to save the checkpoints.
    model_dir: Option<PathBuf>,

    /// Raised to stop the loop.
    shutdown: Option<Arc<AtomicBool>>,
}

impl Trainer {
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig, rollout_config: RolloutBufferConfig) -> Self {
        Self {
            rollout_config,
            episodes: config.episodes,
            epochs: config.epochs,
            save_freq: config.save_freq,
            model_dir: config.model_dir.map(PathBuf::from),
            shutdown: None,
        }
    }

    /// Sets a flag which stops the loop after the current step when raised.
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

    /// Path of the checkpoint after `episode` episodes.
    pub fn checkpoint_path(model_dir: &Path, episode: usize) -> PathBuf {
        model_dir
            .join("ckpt")
            .join(format!("PPO_{}_ep_weights", episode))
    }

    fn save_checkpoint<A: OnPolicyAgent>(&self, agent: &A, episode: usize) {
        if let Some(model_dir) = &self.model_dir {
            let path = Self::checkpoint_path(model_dir, episode);
            match util::save_dir_atomically(&path, |tmp| agent.save_params(tmp)) {
                Ok(()) => info!("Saved the model in {:?}.", &path),
                Err(e) => info!("Failed to save model in {:?}: {}", &path, e),
            }
        }
    }

    /// Runs the agent through the environment and fills the buffer.
    ///
    /// Returns the cumulative reward and net P&L of the episode, or `None` if
    /// the loop was interrupted.
    pub fn collect_rollouts<A: OnPolicyAgent>(
        &self,
        env: &mut MarketEnv,
        agent: &mut A,
        buffer: &mut RolloutBuffer,
    ) -> Result<Option<Record>> {
        buffer.reset();
        let (mut state, _) = env.reset();
        let (mut reward, mut net_pnl) = (0.0, 0.0);

        for t in 0..env.len() - 2 {
            if self.is_interrupted() {
                return Ok(None);
            }

            let out = agent.act(&state)?;
            let (next_state, result, _) = env.step(&state, out.trade, t, PolicyTag::Ppo);
            trace!("t = {}, trade = {}, reward = {}", t, out.trade, result.reward());
            env.store_results(&result, t);
            reward += result.reward();
            net_pnl += result.net_pnl();

            buffer.add(Transition {
                state: state.to_vec(),
                action: out.action,
                reward: result.reward(),
                log_prob: out.log_prob,
                value: out.value,
            });
            state = next_state;
        }

        let next_value = agent.values(&[state.to_vec()])?[0];
        buffer.compute_gae(next_value);

        let mut record = Record::empty();
        record.insert("reward", Scalar(reward as f32));
        record.insert("net_pnl", Scalar(net_pnl as f32));
        Ok(Some(record))
    }

    /// Optimizes the agent on the buffer for `epochs` epochs.
    ///
    /// The records of the optimization steps are stored in the recorder.
    pub fn update<A: OnPolicyAgent>(
        &self,
        agent: &mut A,
        buffer: &mut RolloutBuffer,
        recorder: &mut dyn Recorder,
    ) -> Result<()> {
        let batch_size = buffer.batch_size();
        for epoch in 0..self.epochs {
            for batch in buffer.iter_minibatches(batch_size)? {
                let record = agent.opt_minibatch(&batch)?;
                recorder.store(record);
            }

            if epoch + 1 < self.epochs {
                buffer.recompute_gae(agent)?;
            }
        }
        Ok(())
    }

    /// Train the agent.
    pub fn train<A: OnPolicyAgent>(
        &self,
        env: &mut MarketEnv,
        agent: &mut A,
        recorder: &mut dyn Recorder,
        mut evaluator: Option<&mut dyn Evaluator<A>>,
    ) -> Result<()> {
        if env.len() < 3 {
            return Err(RlfolioError::SeriesShape(format!(
                "a rollout needs at least 3 time indices, got {}",
                env.len()
            ))
            .into());
        }
        let mut buffer = RolloutBuffer::build(&self.rollout_config)?;
        agent.train();

        for e in 0..self.episodes {
            let episode = e + 1;
            let mut record = match self.collect_rollouts(env, agent, &mut buffer)? {
                Some(record) => record,
                None => {
                    info!("Interrupted in episode {}", episode);
                    break;
                }
            };
            self.update(agent, &mut buffer, recorder)?;
            debug!(
                "Episode {}: reward {:?}",
                episode,
                record.get_scalar("reward")
            );

            if self.save_freq > 0 && episode % self.save_freq == 0 {
                self.save_checkpoint(agent, episode);
                if let Some(evaluator) = evaluator.as_mut() {
                    info!("Starts evaluation of the trained model");
                    agent.eval();
                    let eval_record = evaluator.evaluate(agent, episode)?;
                    agent.train();
                    record.merge_inplace(eval_record);
                }
            }

            record.insert("episode", Scalar(episode as f32));
            recorder.flush(episode as i64);
            recorder.write(record);

            if self.is_interrupted() {
                info!("Interrupted after episode {}", episode);
                break;
            }
        }

        Ok(())
    }
}
