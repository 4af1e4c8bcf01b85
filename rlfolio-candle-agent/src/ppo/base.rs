//! PPO agent implemented with candle.
use super::{ActorCritic, PpoConfig};
use crate::model::PolicyValueModel;
use anyhow::{anyhow, Result};
use candle_core::Tensor;
use log::trace;
use rand::{rngs::SmallRng, SeedableRng};
use rlfolio_core::{
    env::State,
    error::RlfolioError,
    record::{Record, RecordValue},
    rollout::Minibatch,
    spaces::{ContinuousActionRange, PolicyType},
    ActOutput, Configurable, OnPolicyAgent, Policy, ValueEstimator,
};
use std::path::Path;

/// Maps an action of the policy distribution to a trade.
enum TradeMap {
    Continuous(ContinuousActionRange),
    Discrete(Vec<f64>),
}

impl TradeMap {
    fn trade(&self, action: &[f32]) -> Result<f64> {
        let a = *action.first().ok_or_else(|| anyhow!("empty action"))?;
        match self {
            Self::Continuous(range) => Ok(range.from_raw(a as f64)),
            Self::Discrete(values) => values
                .get(a as usize)
                .copied()
                .ok_or_else(|| anyhow!("action index {} out of {} trades", a, values.len())),
        }
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// PPO agent.
///
/// The policy-value model is behind [`PolicyValueModel`], [`ActorCritic`] being
/// the one built from [`PpoConfig`] with [`Configurable::build`].
///
/// ```mermaid
/// graph LR
///     A[State]-->B[PolicyValueModel]
///     B-->|PolicyDist|C[sample]
///     B-->|value|D[ActOutput]
///     C-->|raw action|E[trade map]
///     E-->|trade|D
/// ```
pub struct Ppo<M: PolicyValueModel> {
    model: M,
    trade_map: TradeMap,
    clip_param: f64,
    vf_coef: f64,
    ent_coef: f64,
    lr_decay: Option<f64>,
    train: bool,
    n_opts: usize,
    rng: SmallRng,
}

impl<M: PolicyValueModel> Ppo<M> {
    /// Wraps `model` with the hyperparameters of `config`.
    pub fn new(model: M, config: &PpoConfig) -> Result<Self> {
        let trade_map = match config.model.policy_type {
            PolicyType::Continuous => {
                let range = config.action_range.ok_or_else(|| {
                    RlfolioError::InvalidConfig("continuous policy without action_range".into())
                })?;
                range.validate()?;
                TradeMap::Continuous(range)
            }
            PolicyType::Discrete => {
                if config.action_values.len() != config.model.out_dim {
                    return Err(RlfolioError::InvalidConfig(format!(
                        "{} action values for {} logits",
                        config.action_values.len(),
                        config.model.out_dim
                    ))
                    .into());
                }
                TradeMap::Discrete(config.action_values.clone())
            }
        };

        Ok(Self {
            model,
            trade_map,
            clip_param: config.clip_param,
            vf_coef: config.vf_coef,
            ent_coef: config.ent_coef,
            lr_decay: config.lr_decay,
            train: false,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// The policy-value model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    fn state_tensor(&self, state: &State) -> Result<Tensor> {
        let s = state.to_vec();
        let d = s.len();
        Ok(Tensor::from_vec(s, (1, d), self.model.device())?)
    }

    /// One clipped-surrogate update on a minibatch.
    ///
    /// `loss = vf_coef * loss_critic + loss_actor - ent_coef * entropy`, where
    /// `loss_actor` is the negated mean of `min(ratio * adv, clip(ratio) * adv)`
    /// and `loss_critic` the mean squared error of the values to the returns.
    pub fn train_minibatch(&mut self, batch: &Minibatch) -> Result<Record> {
        let device = self.model.device().clone();
        let n = batch.len();
        let state = Tensor::from_slice(&batch.state, (n, batch.state_dim), &device)?;
        let action = Tensor::from_slice(&batch.action, (n, batch.action_dim), &device)?;
        let old_log_prob = Tensor::from_slice(&batch.log_prob, n, &device)?;
        let returns = Tensor::from_slice(&batch.returns, n, &device)?;
        let advantage = Tensor::from_slice(&batch.advantage, n, &device)?;

        let (dist, value) = self.model.forward(&state, true)?;
        let log_prob = dist.log_prob(&action)?;
        let entropy = dist.entropy()?.mean_all()?;

        let ratio = (log_prob - old_log_prob)?.exp()?;
        let surr1 = (&ratio * &advantage)?;
        let surr2 = (ratio.clamp(1.0 - self.clip_param, 1.0 + self.clip_param)? * &advantage)?;
        let loss_actor = surr1.minimum(&surr2)?.mean_all()?.neg()?;
        let loss_critic = (returns - value)?.sqr()?.mean_all()?;
        let loss = (((&loss_critic * self.vf_coef)? + &loss_actor)?
            - (&entropy * self.ent_coef)?)?;

        self.model.backward_step(&loss)?;
        let lr = self.model.learning_rate();
        if let Some(gamma) = self.lr_decay {
            self.model.set_learning_rate(lr * gamma);
        }
        self.n_opts += 1;

        let loss = loss.to_scalar::<f32>()?;
        trace!("n_opts = {}, loss = {}", self.n_opts, loss);

        Ok(Record::from_slice(&[
            ("loss", RecordValue::Scalar(loss)),
            ("loss_actor", RecordValue::Scalar(loss_actor.to_scalar::<f32>()?)),
            ("loss_critic", RecordValue::Scalar(loss_critic.to_scalar::<f32>()?)),
            ("entropy", RecordValue::Scalar(entropy.to_scalar::<f32>()?)),
            ("lr", RecordValue::Scalar(lr as f32)),
        ]))
    }
}

impl Configurable for Ppo<ActorCritic> {
    type Config = PpoConfig;

    fn build(config: Self::Config) -> Result<Self> {
        let model = ActorCritic::build(config.model.clone())?;
        Self::new(model, &config)
    }
}

impl<M: PolicyValueModel> Policy for Ppo<M> {
    /// Trade of the mean action of a continuous policy, the most likely one of a discrete policy.
    fn sample(&mut self, state: &State) -> Result<f64> {
        let obs = self.state_tensor(state)?;
        let (dist, _) = self.model.forward(&obs, false)?;
        let action: Vec<f32> = dist.mode()?.flatten_all()?.to_vec1()?;
        self.trade_map.trade(&action)
    }
}

impl<M: PolicyValueModel> ValueEstimator for Ppo<M> {
    fn values(&mut self, states: &[Vec<f32>]) -> Result<Vec<f64>> {
        let n = states.len();
        if n == 0 {
            return Ok(vec![]);
        }
        let d = states[0].len();
        let flat: Vec<f32> = states.iter().flatten().copied().collect();
        let obs = Tensor::from_vec(flat, (n, d), self.model.device())?;
        let (_, value) = self.model.forward(&obs, false)?;
        Ok(value
            .to_vec1::<f32>()?
            .into_iter()
            .map(|v| v as f64)
            .collect())
    }
}

impl<M: PolicyValueModel> OnPolicyAgent for Ppo<M> {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn act(&mut self, state: &State) -> Result<ActOutput> {
        let obs = self.state_tensor(state)?;
        let (dist, value) = self.model.forward(&obs, false)?;
        let raw = dist.sample(&mut self.rng)?;
        let log_prob = dist.log_prob(&raw)?.to_vec1::<f32>()?[0];
        let action: Vec<f32> = raw.flatten_all()?.to_vec1()?;
        let trade = self.trade_map.trade(&action)?;

        Ok(ActOutput {
            action,
            trade,
            log_prob: log_prob as f64,
            value: value.to_vec1::<f32>()?[0] as f64,
        })
    }

    fn opt_minibatch(&mut self, batch: &Minibatch) -> Result<Record> {
        self.train_minibatch(batch)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.model.save(path)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyDist;
    use candle_core::{DType, Device};
    use rlfolio_core::spaces::{ActionSpace, DiscreteSpace};

    /// Standard normal policy and a constant value, without parameters.
    struct StubModel {
        device: Device,
        value: f32,
        lr: f64,
        n_steps: usize,
    }

    impl PolicyValueModel for StubModel {
        fn device(&self) -> &Device {
            &self.device
        }

        fn forward(&mut self, obs: &Tensor, _train: bool) -> Result<(PolicyDist, Tensor)> {
            let n = obs.dims()[0];
            let dist = PolicyDist::Gaussian {
                mean: Tensor::zeros((n, 1), DType::F32, &Device::Cpu)?,
                log_std: Tensor::zeros((1, 1), DType::F32, &Device::Cpu)?,
            };
            let value = Tensor::full(self.value, n, &Device::Cpu)?;
            Ok((dist, value))
        }

        fn backward_step(&mut self, _loss: &Tensor) -> Result<()> {
            self.n_steps += 1;
            Ok(())
        }

        fn learning_rate(&self) -> f64 {
            self.lr
        }

        fn set_learning_rate(&mut self, lr: f64) {
            self.lr = lr;
        }

        fn save(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        fn load(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn stub_agent() -> Result<Ppo<StubModel>> {
        let model = StubModel {
            device: Device::Cpu,
            value: 0.5,
            lr: 0.1,
            n_steps: 0,
        };
        let config = PpoConfig::default()
            .continuous(ContinuousActionRange::symmetric(10.0)?)
            .clip_param(0.2)
            .vf_coef(0.5)
            .ent_coef(0.01)
            .lr_decay(Some(0.5));
        Ppo::new(model, &config)
    }

    fn minibatch(action: [f32; 2], log_prob: [f32; 2]) -> Minibatch {
        Minibatch {
            state: vec![0.0; 4],
            state_dim: 2,
            action: action.to_vec(),
            action_dim: 1,
            log_prob: log_prob.to_vec(),
            returns: vec![1.0, 0.0],
            advantage: vec![1.0, -2.0],
        }
    }

    fn expected_loss(action: [f64; 2], old_log_prob: [f64; 2]) -> f64 {
        let c = 0.5 * (2.0 * std::f64::consts::PI).ln();
        let adv = [1.0, -2.0];
        let surr = (0..2)
            .map(|i| {
                let ratio = (-0.5 * action[i] * action[i] - c - old_log_prob[i]).exp();
                (ratio * adv[i]).min(ratio.clamp(0.8, 1.2) * adv[i])
            })
            .sum::<f64>()
            / 2.0;
        let loss_critic = (0.25 + 0.25) / 2.0;
        let entropy = 0.5 + c;
        0.5 * loss_critic - surr - 0.01 * entropy
    }

    #[test]
    fn test_ppo_loss() -> Result<()> {
        let mut agent = stub_agent()?;

        // ratios inside the clipping interval
        let record = agent.train_minibatch(&minibatch([0.5, -1.0], [-1.0, -1.2]))?;
        let loss = record.get_scalar("loss")? as f64;
        assert!((loss - expected_loss([0.5, -1.0], [-1.0, -1.2])).abs() < 1e-5);
        assert!((record.get_scalar("loss_critic")? - 0.25).abs() < 1e-6);

        // the ratio of the first transition is clipped
        let record = agent.train_minibatch(&minibatch([0.5, -1.0], [-2.5, -1.2]))?;
        let loss = record.get_scalar("loss")? as f64;
        assert!((loss - expected_loss([0.5, -1.0], [-2.5, -1.2])).abs() < 1e-5);

        assert_eq!(agent.model().n_steps, 2);
        assert_eq!(agent.n_opts(), 2);
        assert_eq!(record.get_scalar("lr")?, 0.05);
        assert_eq!(agent.model().lr, 0.025);
        Ok(())
    }

    #[test]
    fn test_continuous_act_and_sample() -> Result<()> {
        let mut agent = stub_agent()?;
        let state = State::flat(0.01, 3.0);

        for _ in 0..10 {
            let out = agent.act(&state)?;
            assert_eq!(out.action.len(), 1);
            assert_eq!(out.trade, 10.0 * (out.action[0] as f64).tanh());
            assert!(out.trade.abs() <= 10.0);
            assert_eq!(out.value, 0.5);
        }
        // mean action 0 maps to no trade
        assert_eq!(agent.sample(&state)?, 0.0);
        assert_eq!(agent.values(&[state.to_vec(), state.to_vec()])?, vec![0.5, 0.5]);
        Ok(())
    }

    #[test]
    fn test_discrete_agent() -> Result<()> {
        let space = ActionSpace::new(2.0, 1.0, true)?;
        let mut config = PpoConfig::default().state_dim(2).discrete(&space);
        config.model = config.model.hidden_units(vec![8], vec![8]);
        let mut agent = Ppo::<ActorCritic>::build(config)?;
        let state = State::flat(0.01, 0.0);

        for _ in 0..10 {
            let out = agent.act(&state)?;
            assert_eq!(out.action.len(), 1);
            assert!(space.contains(out.trade));
            assert_eq!(out.trade, space.value(out.action[0] as usize));
            assert!(out.log_prob <= 0.0);
        }
        assert!(space.contains(agent.sample(&state)?));
        Ok(())
    }

    #[test]
    fn test_continuous_without_range() {
        let config = PpoConfig::default();
        assert!(Ppo::<ActorCritic>::build(config).is_err());
    }

    #[test]
    fn test_continuous_degenerate_range() -> Result<()> {
        let mut config: PpoConfig = serde_yaml::from_str("action_range:\n  min: 2.0\n  max: 2.0\n")?;
        config.model = config.model.hidden_units(vec![4], vec![4]);
        assert!(Ppo::<ActorCritic>::build(config).is_err());
        Ok(())
    }

    #[test]
    fn test_actor_critic_update() -> Result<()> {
        let config = PpoConfig::default()
            .continuous(ContinuousActionRange::symmetric(5.0)?)
            .lr_decay(Some(0.9));
        let mut agent = Ppo::<ActorCritic>::build(config)?;
        let lr0 = agent.model().learning_rate();
        let batch = minibatch([0.5, -1.0], [-1.0, -1.2]);

        let record = agent.opt_minibatch(&batch)?;
        assert!(record.get_scalar("loss")?.is_finite());
        assert!((agent.model().learning_rate() - 0.9 * lr0).abs() < 1e-12);
        Ok(())
    }
}
