//! DQN agent implemented with candle.
use super::{config::DqnConfig, model::DqnModel, ReplayBuffer, TargetUpdate};
use crate::{
    mlp::Mlp,
    util::{smooth_l1_loss, track, CriticLoss},
};
use anyhow::{anyhow, Result};
use candle_core::{shape::D, Device, Tensor};
use candle_nn::loss::mse;
use log::{debug, trace};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rlfolio_core::{
    env::State,
    record::{Record, RecordValue},
    Configurable, Experience, OffPolicyAgent, Policy,
};
use std::{fs, path::Path};

#[allow(clippy::upper_case_acronyms)]
/// DQN agent implemented with candle.
///
/// The Q-network has one output per trade of the action space. The TD target of
/// a transition is `r + discount_factor * max_a Q_tgt(s', a)`; the series is
/// continuing, so there is no terminal state.
pub struct Dqn {
    qnet: DqnModel<Mlp>,
    qnet_tgt: DqnModel<Mlp>,
    replay_buffer: ReplayBuffer,
    action_values: Vec<f64>,
    batch_size: usize,
    discount_factor: f64,
    target_update: TargetUpdate,
    tau: f64,
    copy_step: usize,
    start_train: usize,
    critic_loss: CriticLoss,
    device: Device,
    n_opts: usize,
    rng: SmallRng,
}

impl Dqn {
    /// Index of the largest action-value, the first one on ties.
    fn greedy(&self, state: &State) -> Result<usize> {
        let q = self
            .qnet
            .q_values(&[state.to_vec()])?
            .pop()
            .ok_or_else(|| anyhow!("no action-values"))?;
        let mut best = 0;
        for (i, v) in q.iter().enumerate() {
            if *v > q[best] {
                best = i;
            }
        }
        Ok(best)
    }

    fn update_critic(&mut self) -> Result<f32> {
        let batch = self.replay_buffer.batch(self.batch_size);
        let n = batch.len();
        let d = batch.state.len() / n;
        let obs = Tensor::from_vec(batch.state, (n, d), &self.device)?;
        let act = Tensor::from_vec(batch.action, (n, 1), &self.device)?;
        let reward = Tensor::from_vec(batch.reward, n, &self.device)?;
        let next_obs = Tensor::from_vec(batch.next_state, (n, d), &self.device)?;

        let pred = self
            .qnet
            .forward(&obs)?
            .gather(&act, D::Minus1)?
            .squeeze(D::Minus1)?;
        let tgt = {
            let q = self.qnet_tgt.forward(&next_obs)?.max(D::Minus1)?;
            (reward + (q * self.discount_factor)?)?.detach()
        };

        let loss = match self.critic_loss {
            CriticLoss::Mse => mse(&pred, &tgt)?,
            CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
        };
        self.qnet.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn update_target(&mut self, iter: usize) -> Result<()> {
        match self.target_update {
            TargetUpdate::Hard if (iter + 1) % self.copy_step == 0 => {
                debug!("Copy the Q-network to the target network at iteration {}", iter);
                track(self.qnet_tgt.get_varmap(), self.qnet.get_varmap(), 1.0)?;
            }
            TargetUpdate::Hard => {}
            TargetUpdate::Soft => {
                track(self.qnet_tgt.get_varmap(), self.qnet.get_varmap(), self.tau)?;
            }
        }
        Ok(())
    }

    /// Number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Number of transitions in the replay buffer.
    pub fn replay_buffer_len(&self) -> usize {
        self.replay_buffer.len()
    }

    /// The Q-network.
    pub fn qnet(&self) -> &DqnModel<Mlp> {
        &self.qnet
    }

    /// The target network.
    pub fn qnet_tgt(&self) -> &DqnModel<Mlp> {
        &self.qnet_tgt
    }
}

impl Configurable for Dqn {
    type Config = DqnConfig;

    /// Constructs DQN agent.
    ///
    /// The target network starts as a copy of the Q-network.
    fn build(config: Self::Config) -> Result<Self> {
        config.validate()?;
        let device: Device = config.device.try_into()?;
        let qnet = DqnModel::build(config.model_config.clone(), &device)?;
        let qnet_tgt = DqnModel::build(config.model_config, &device)?;
        track(qnet_tgt.get_varmap(), qnet.get_varmap(), 1.0)?;

        Ok(Dqn {
            qnet,
            qnet_tgt,
            replay_buffer: ReplayBuffer::new(config.capacity, config.seed),
            action_values: config.action_values,
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            target_update: config.target_update,
            tau: config.tau,
            copy_step: config.copy_step,
            start_train: config.start_train,
            critic_loss: config.critic_loss,
            device,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }
}

impl Policy for Dqn {
    /// Greedy trade.
    fn sample(&mut self, state: &State) -> Result<f64> {
        Ok(self.action_values[self.greedy(state)?])
    }
}

impl OffPolicyAgent for Dqn {
    fn eps_greedy(&mut self, state: &State, epsilon: f64) -> Result<f64> {
        if self.rng.gen::<f64>() < epsilon {
            let i = self.rng.gen_range(0..self.action_values.len());
            Ok(self.action_values[i])
        } else {
            self.sample(state)
        }
    }

    fn push(&mut self, experience: Experience) -> Result<()> {
        let action = self
            .action_values
            .iter()
            .position(|v| *v == experience.trade)
            .ok_or_else(|| anyhow!("{} is not a trade of the action space", experience.trade))?;
        self.replay_buffer.push(
            experience.state,
            action as u32,
            experience.reward as f32,
            experience.next_state,
        );
        Ok(())
    }

    /// Optimizes the Q-network after `start_train` iterations, once the replay
    /// buffer holds a minibatch.
    ///
    /// After `start_train` iterations the target network is copied when
    /// `iter + 1` is a multiple of `copy_step` (hard) or moved by `tau` (soft),
    /// whether or not the Q-network was optimized.
    fn opt(&mut self, iter: usize) -> Result<Option<Record>> {
        if iter <= self.start_train {
            return Ok(None);
        }

        let record = match self.replay_buffer.len() < self.batch_size {
            true => None,
            false => {
                let loss_critic = self.update_critic()?;
                self.n_opts += 1;
                trace!("iter = {}, loss_critic = {}", iter, loss_critic);
                Some(Record::from_slice(&[(
                    "loss_critic",
                    RecordValue::Scalar(loss_critic),
                )]))
            }
        };
        self.update_target(iter)?;

        Ok(record)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.qnet.save(path.join("qnet.safetensors"))?;
        self.qnet_tgt.save(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.safetensors"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mlp::MlpConfig, opt::OptimizerConfig};
    use rlfolio_core::spaces::ActionSpace;
    use tempdir::TempDir;

    fn config() -> Result<DqnConfig> {
        Ok(DqnConfig::default()
            .q_config(MlpConfig::new(2, vec![16], 1))
            .action_space(&ActionSpace::new(2.0, 1.0, true)?)
            .opt_config(OptimizerConfig::adam(1e-2))
            .batch_size(4)
            .capacity(100)
            .start_train(5)
            .target_update(TargetUpdate::Hard, 1.0, 10)
            .seed(0))
    }

    fn params(model: &DqnModel<Mlp>) -> Vec<f32> {
        let data = model.get_varmap().data().lock().unwrap();
        let mut keys: Vec<_> = data.keys().cloned().collect();
        keys.sort();
        keys.iter()
            .flat_map(|k| {
                data[k]
                    .as_tensor()
                    .flatten_all()
                    .unwrap()
                    .to_vec1::<f32>()
                    .unwrap()
            })
            .collect()
    }

    fn experience(i: usize, trade: f64) -> Experience {
        Experience {
            state: vec![0.01 * i as f32, trade as f32],
            trade,
            reward: -0.1 * trade * trade,
            next_state: vec![0.01 * (i + 1) as f32, trade as f32],
        }
    }

    #[test]
    fn test_target_starts_as_copy() -> Result<()> {
        let agent = Dqn::build(config()?)?;
        assert_eq!(params(agent.qnet()), params(agent.qnet_tgt()));
        Ok(())
    }

    #[test]
    fn test_eps_greedy() -> Result<()> {
        let mut agent = Dqn::build(config()?)?;
        let state = State::flat(0.0, 0.0);
        let greedy = agent.sample(&state)?;

        for _ in 0..20 {
            assert_eq!(agent.eps_greedy(&state, 0.0)?, greedy);
            let trade = agent.eps_greedy(&state, 1.0)?;
            assert!([-2.0, -1.0, 0.0, 1.0, 2.0].contains(&trade));
        }
        Ok(())
    }

    #[test]
    fn test_warm_up_and_hard_copy() -> Result<()> {
        let mut agent = Dqn::build(config()?)?;
        let trades = [-2.0, -1.0, 0.0, 1.0, 2.0];

        for i in 0..=5 {
            agent.push(experience(i, trades[i % 5]))?;
            assert!(agent.opt(i)?.is_none());
        }
        for i in 6..9 {
            agent.push(experience(i, trades[i % 5]))?;
            let record = agent.opt(i)?.unwrap();
            assert!(record.get_scalar("loss_critic")?.is_finite());
        }
        assert_eq!(agent.n_opts(), 3);
        assert_ne!(params(agent.qnet()), params(agent.qnet_tgt()));

        // (9 + 1) % copy_step == 0
        agent.push(experience(9, 0.0))?;
        agent.opt(9)?;
        assert_eq!(params(agent.qnet()), params(agent.qnet_tgt()));

        assert!(agent.push(experience(10, 0.5)).is_err());
        Ok(())
    }

    #[test]
    fn test_hard_copy_without_update() -> Result<()> {
        let dir = TempDir::new("dqn_copy")?;
        let mut trained = Dqn::build(config()?)?;
        let trades = [-2.0, -1.0, 0.0, 1.0, 2.0];
        for i in 0..9 {
            trained.push(experience(i, trades[i % 5]))?;
            trained.opt(i)?;
        }
        assert_ne!(params(trained.qnet()), params(trained.qnet_tgt()));
        trained.save_params(dir.path())?;

        // the replay buffer never holds a minibatch
        let config = config()?
            .batch_size(64)
            .target_update(TargetUpdate::Hard, 1.0, 3);
        let mut agent = Dqn::build(config)?;
        agent.load_params(dir.path())?;

        // (2 + 1) % copy_step == 0 during warm-up
        assert!(agent.opt(2)?.is_none());
        assert_ne!(params(agent.qnet()), params(agent.qnet_tgt()));
        assert!(agent.opt(6)?.is_none());
        assert_ne!(params(agent.qnet()), params(agent.qnet_tgt()));

        // (8 + 1) % copy_step == 0
        assert!(agent.opt(8)?.is_none());
        assert_eq!(params(agent.qnet()), params(agent.qnet_tgt()));
        assert_eq!(agent.n_opts(), 0);
        Ok(())
    }

    #[test]
    fn test_soft_update() -> Result<()> {
        let config = config()?.target_update(TargetUpdate::Soft, 0.5, 1).start_train(0);
        let mut agent = Dqn::build(config)?;
        for i in 0..4 {
            agent.push(experience(i, 1.0))?;
        }
        let before = params(agent.qnet_tgt());
        agent.opt(4)?;
        let (q, tgt) = (params(agent.qnet()), params(agent.qnet_tgt()));
        for k in 0..q.len() {
            assert!((tgt[k] - (0.5 * q[k] + 0.5 * before[k])).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let mut agent = Dqn::build(config()?)?;
        let dir = TempDir::new("dqn")?;
        agent.save_params(dir.path())?;
        assert!(dir.path().join("qnet.safetensors").exists());

        let mut agent_ = Dqn::build(config()?)?;
        agent_.load_params(dir.path())?;
        assert_eq!(params(agent.qnet()), params(agent_.qnet()));

        let state = State::flat(0.02, 1.0);
        assert_eq!(agent.sample(&state)?, agent_.sample(&state)?);
        Ok(())
    }
}
