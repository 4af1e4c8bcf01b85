//! Actor-critic network of PPO.
use crate::{
    mlp::{Activation, Mlp, MlpConfig},
    model::{PolicyValueModel, SubModel1},
    opt::{Optimizer, OptimizerConfig},
    Device, PolicyDist,
};
use anyhow::{bail, Result};
use candle_core::{DType, Tensor, D};
use candle_nn::{batch_norm, BatchNorm, BatchNormConfig, Init, ModuleT, VarBuilder, VarMap};
use log::info;
use rand::{rngs::SmallRng, SeedableRng};
use rlfolio_core::spaces::PolicyType;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

const PARAMS_FILE: &str = "model.safetensors";

/// Configuration of [`ActorCritic`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct ActorCriticConfig {
    /// Length of a flattened state.
    pub in_dim: usize,

    /// Hidden units of the critic.
    pub hidden_units_value: Vec<usize>,

    /// Hidden units of the actor.
    pub hidden_units_actor: Vec<usize>,

    /// Output dimension of the actor.
    pub out_dim: usize,

    /// Activation function of the hidden layers.
    pub activation: Activation,

    /// Output type of the actor.
    pub policy_type: PolicyType,

    /// Initial value of the log standard deviation of a continuous policy.
    pub pol_std: f64,

    /// Normalizes the input of both networks over the batch.
    pub batch_norm_input: bool,

    /// Normalizes the output of the critic over the batch.
    pub batch_norm_value_out: bool,

    /// Optimizer of all the parameters.
    pub opt_config: OptimizerConfig,

    /// Device of the parameters.
    pub device: Device,

    /// Seed of the noise replacing NaN logits.
    pub seed: u64,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            in_dim: 2,
            hidden_units_value: vec![64, 64],
            hidden_units_actor: vec![64, 64],
            out_dim: 1,
            activation: Activation::Relu,
            policy_type: PolicyType::Continuous,
            pol_std: 0.0,
            batch_norm_input: false,
            batch_norm_value_out: false,
            opt_config: OptimizerConfig::Adam {
                lr: 3e-4,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-7,
            },
            device: Device::Cpu,
            seed: 42,
        }
    }
}

impl ActorCriticConfig {
    /// Sets the hidden units of the critic and the actor.
    pub fn hidden_units(mut self, value: Vec<usize>, actor: Vec<usize>) -> Self {
        self.hidden_units_value = value;
        self.hidden_units_actor = actor;
        self
    }

    /// Sets the activation function.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Sets the initial log standard deviation.
    pub fn pol_std(mut self, v: f64) -> Self {
        self.pol_std = v;
        self
    }

    /// Sets the batch normalization of the input and of the critic output.
    pub fn batch_norm(mut self, input: bool, value_out: bool) -> Self {
        self.batch_norm_input = input;
        self.batch_norm_value_out = value_out;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// Critic and actor MLPs sharing the input, with a state-independent log standard
/// deviation for the continuous policy.
///
/// The output layers of both networks start with `N(0, 0.01)` weights and a
/// bias of `0.01`. The optional batch normalization layers have no learnable
/// parameters; their running statistics are saved with the weights.
pub struct ActorCritic {
    device: candle_core::Device,
    varmap: VarMap,
    critic_bn: Option<BatchNorm>,
    actor_bn: Option<BatchNorm>,
    value_bn: Option<BatchNorm>,
    critic: Mlp,
    actor: Mlp,
    log_std: Option<Tensor>,
    policy_type: PolicyType,
    opt: Optimizer,
    rng: SmallRng,
}

impl ActorCritic {
    /// Constructs [`ActorCritic`].
    pub fn build(config: ActorCriticConfig) -> Result<Self> {
        let device: candle_core::Device = config.device.try_into()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let bn_config = BatchNormConfig {
            affine: false,
            ..Default::default()
        };
        let bn = |on: bool, n: usize, name: &str| -> Result<Option<BatchNorm>> {
            match on {
                true => Ok(Some(batch_norm(n, bn_config, vb.pp(name))?)),
                false => Ok(None),
            }
        };
        let critic_bn = bn(config.batch_norm_input, config.in_dim, "critic_bn")?;
        let actor_bn = bn(config.batch_norm_input, config.in_dim, "actor_bn")?;
        let value_bn = bn(config.batch_norm_value_out, 1, "value_bn")?;

        let critic = {
            let config = MlpConfig::new(config.in_dim, config.hidden_units_value.clone(), 1)
                .activation(config.activation)
                .small_head(true);
            Mlp::build(vb.pp("critic"), config)?
        };
        let actor = {
            let mlp_config = MlpConfig::new(
                config.in_dim,
                config.hidden_units_actor.clone(),
                config.out_dim,
            )
            .activation(config.activation)
            .small_head(true);
            Mlp::build(vb.pp("actor"), mlp_config)?
        };
        let log_std = match config.policy_type {
            PolicyType::Continuous => Some(vb.get_with_hints(
                (1, config.out_dim),
                "log_std",
                Init::Const(config.pol_std),
            )?),
            PolicyType::Discrete => None,
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            critic_bn,
            actor_bn,
            value_bn,
            critic,
            actor,
            log_std,
            policy_type: config.policy_type,
            opt,
            rng: SmallRng::seed_from_u64(config.seed),
        })
    }

    /// Variables of the network.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn uses_batch_norm(&self) -> bool {
        self.critic_bn.is_some() || self.value_bn.is_some()
    }
}

fn normalize(bn: &Option<BatchNorm>, xs: &Tensor, train: bool) -> Result<Tensor> {
    match bn {
        Some(bn) => Ok(bn.forward_t(xs, train)?),
        None => Ok(xs.clone()),
    }
}

impl PolicyValueModel for ActorCritic {
    fn device(&self) -> &candle_core::Device {
        &self.device
    }

    fn forward(&mut self, obs: &Tensor, train: bool) -> Result<(PolicyDist, Tensor)> {
        if train && self.uses_batch_norm() && obs.dim(0)? < 2 {
            bail!("batch normalization needs more than one state per batch");
        }
        let value = {
            let xs = normalize(&self.critic_bn, obs, train)?;
            let xs = self.critic.forward(&xs)?;
            normalize(&self.value_bn, &xs, train)?.squeeze(D::Minus1)?
        };
        let out = self.actor.forward(&normalize(&self.actor_bn, obs, train)?)?;
        let dist = match (self.policy_type, &self.log_std) {
            (PolicyType::Continuous, Some(log_std)) => PolicyDist::Gaussian {
                mean: out,
                log_std: log_std.clone(),
            },
            _ => PolicyDist::categorical(out, &mut self.rng)?,
        };
        Ok((dist, value))
    }

    fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    fn learning_rate(&self) -> f64 {
        self.opt.learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.opt.set_learning_rate(lr)
    }

    fn save(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        let path = path.join(PARAMS_FILE);
        self.varmap.save(&path)?;
        info!("Save actor-critic to {:?}", path);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let path = path.join(PARAMS_FILE);
        self.varmap.load(&path)?;
        info!("Load actor-critic from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn obs() -> Result<Tensor> {
        Ok(Tensor::from_slice(
            &[0.1f32, 2.0, -0.3, -1.0, 0.0, 0.0],
            (3, 2),
            &candle_core::Device::Cpu,
        )?)
    }

    #[test]
    fn test_continuous_output() -> Result<()> {
        let config = ActorCriticConfig::default()
            .hidden_units(vec![8], vec![8, 8])
            .pol_std(-0.5);
        let mut model = ActorCritic::build(config)?;
        let (dist, value) = model.forward(&obs()?, false)?;

        assert_eq!(value.dims(), &[3]);
        match dist {
            PolicyDist::Gaussian { mean, log_std } => {
                assert_eq!(mean.dims(), &[3, 1]);
                let log_std: Vec<Vec<f32>> = log_std.to_vec2()?;
                assert_eq!(log_std, vec![vec![-0.5]]);
            }
            _ => panic!("expected a Gaussian policy"),
        }
        Ok(())
    }

    #[test]
    fn test_save_load() -> Result<()> {
        let config = ActorCriticConfig {
            policy_type: PolicyType::Discrete,
            out_dim: 4,
            seed: 1,
            ..Default::default()
        };
        let mut model = ActorCritic::build(config.clone())?;
        let dir = TempDir::new("actor_critic")?;
        model.save(dir.path())?;
        assert!(dir.path().join(PARAMS_FILE).exists());

        let mut model_ = ActorCritic::build(ActorCriticConfig { seed: 2, ..config })?;
        model_.load(dir.path())?;

        let (_, v) = model.forward(&obs()?, false)?;
        let (_, v_) = model_.forward(&obs()?, false)?;
        assert_eq!(v.to_vec1::<f32>()?, v_.to_vec1::<f32>()?);
        Ok(())
    }

    fn running_mean(model: &ActorCritic, name: &str) -> Result<Vec<f32>> {
        let data = model.get_varmap().data().lock().unwrap();
        Ok(data[name].as_tensor().to_vec1()?)
    }

    #[test]
    fn test_batch_norm() -> Result<()> {
        let config = ActorCriticConfig::default()
            .hidden_units(vec![8], vec![8])
            .batch_norm(true, true);
        let mut model = ActorCritic::build(config)?;
        assert_eq!(running_mean(&model, "critic_bn.running_mean")?, vec![0.0, 0.0]);

        // batch statistics: the normalized values have zero mean
        let (_, value) = model.forward(&obs()?, true)?;
        let value: Vec<f32> = value.to_vec1()?;
        assert_eq!(value.len(), 3);
        assert!(value.iter().sum::<f32>().abs() < 1e-4);

        // the running statistics moved towards the batch mean of the input
        let mean = running_mean(&model, "actor_bn.running_mean")?;
        assert!((mean[0] - 0.1 * (0.1 - 0.3 + 0.0) / 3.0).abs() < 1e-6);
        assert!((mean[1] - 0.1 * (2.0 - 1.0 + 0.0) / 3.0).abs() < 1e-6);
        assert_eq!(running_mean(&model, "critic_bn.running_mean")?, mean);

        // a single state is normalized by the running statistics only
        let state = Tensor::from_slice(&[0.1f32, 2.0], (1, 2), &candle_core::Device::Cpu)?;
        assert_eq!(model.forward(&state, false)?.1.dims(), &[1]);
        assert!(model.forward(&state, true).is_err());
        Ok(())
    }
}
