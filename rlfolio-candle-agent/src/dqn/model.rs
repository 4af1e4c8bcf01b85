use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::OutDim,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of [`DqnModel`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnModelConfig<Q: OutDim> {
    /// Action-value function, one output per trade.
    pub q_config: Q,

    /// Optimizer of the action-value function.
    pub opt_config: OptimizerConfig,
}

impl<Q: OutDim> DqnModelConfig<Q> {
    /// Constructs [`DqnModelConfig`].
    pub fn new(q_config: Q, opt_config: OptimizerConfig) -> Self {
        Self {
            q_config,
            opt_config,
        }
    }

    /// Sets the configuration of the action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = v;
        self
    }

    /// Sets the number of trades.
    pub fn out_dim(mut self, v: usize) -> Self {
        self.q_config.set_out_dim(v);
        self
    }

    /// Number of trades.
    pub fn get_out_dim(&self) -> usize {
        self.q_config.get_out_dim()
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// Action-value function over flattened states, with its own variables and
/// optimizer.
pub struct DqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
{
    varmap: VarMap,
    device: Device,
    n_trades: usize,
    q: Q,
    opt: Optimizer,
}

impl<Q> DqnModel<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: OutDim,
{
    /// Constructs [`DqnModel`].
    pub fn build(config: DqnModelConfig<Q::Config>, device: &Device) -> Result<Self> {
        let n_trades = config.get_out_dim();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let q = Q::build(vb, config.q_config)?;
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            device: device.clone(),
            n_trades,
            q,
            opt,
        })
    }

    /// Action-values of a batch of observations, `(batch, n_trades)`.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        self.q.forward(obs)
    }

    /// Action-values of each state, one row per state.
    pub fn q_values(&self, states: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        let n = states.len();
        let d = states.first().map(|s| s.len()).unwrap_or(0);
        let flat: Vec<f32> = states.iter().flatten().copied().collect();
        let obs = Tensor::from_vec(flat, (n, d), &self.device)?;
        Ok(self.forward(&obs)?.to_vec2()?)
    }

    /// Number of trades.
    pub fn out_dim(&self) -> usize {
        self.n_trades
    }

    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Variables of the model.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the variables in a safetensors file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved the Q-network to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the variables from a safetensors file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Loaded the Q-network from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, MlpConfig};

    #[test]
    fn test_q_values() -> Result<()> {
        let config = DqnModelConfig::new(MlpConfig::new(2, vec![4], 1), OptimizerConfig::adam(1e-3))
            .out_dim(5);
        assert_eq!(config.get_out_dim(), 5);

        let model = DqnModel::<Mlp>::build(config, &Device::Cpu)?;
        let q = model.q_values(&[vec![0.0, 1.0], vec![0.5, -1.0], vec![0.1, 0.0]])?;
        assert_eq!(model.out_dim(), 5);
        assert_eq!(q.len(), 3);
        assert!(q.iter().all(|row| row.len() == 5));
        Ok(())
    }
}
