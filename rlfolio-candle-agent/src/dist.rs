//! Policy distributions.
use anyhow::{anyhow, Result};
use candle_core::{DType, Tensor, D};
use candle_nn::ops::{log_softmax, softmax};
use log::warn;
use rand::{distributions::WeightedIndex, Rng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

static NAN_LOGIT_FALLBACKS: AtomicUsize = AtomicUsize::new(0);

/// Number of times NaN logits were replaced by uniform noise in this process.
pub fn nan_logit_fallbacks() -> usize {
    NAN_LOGIT_FALLBACKS.load(Ordering::Relaxed)
}

/// Distribution of actions given a batch of states.
///
/// Actions are tensors of shape `(batch_size, action_dim)`. For the categorical
/// distribution `action_dim` is 1 and the element is the index of the category.
pub enum PolicyDist {
    /// Diagonal Gaussian. `mean` is `(batch_size, dim)`, `log_std` is `(1, dim)`.
    Gaussian {
        /// Mean.
        mean: Tensor,

        /// Log standard deviation, shared by the batch.
        log_std: Tensor,
    },

    /// Categorical over the columns of `logits`, `(batch_size, n)`.
    Categorical {
        /// Unnormalized log-probabilities.
        logits: Tensor,
    },
}

impl PolicyDist {
    /// Categorical distribution.
    ///
    /// If `logits` contain a NaN, the whole tensor is replaced by uniform noise in
    /// `[-0.01, 0.01]`, which is logged and counted in [`nan_logit_fallbacks`].
    pub fn categorical<R: Rng>(logits: Tensor, rng: &mut R) -> Result<Self> {
        let values: Vec<f32> = logits.flatten_all()?.to_vec1()?;
        if !values.iter().any(|x| x.is_nan()) {
            return Ok(Self::Categorical { logits });
        }

        let n = NAN_LOGIT_FALLBACKS.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("NaN in logits, replaced by uniform noise ({} times)", n);
        let noise: Vec<f32> = (0..values.len())
            .map(|_| rng.gen_range(-0.01f32..=0.01))
            .collect();
        let logits = Tensor::from_vec(noise, logits.shape().clone(), logits.device())?;
        Ok(Self::Categorical { logits })
    }

    /// Log-probability of each action, `(batch_size,)`.
    pub fn log_prob(&self, action: &Tensor) -> Result<Tensor> {
        match self {
            Self::Gaussian { mean, log_std } => {
                let var = (log_std * 2.0)?.exp()?;
                let d2 = action.broadcast_sub(mean)?.sqr()?;
                let lp = (d2.broadcast_div(&(var * 2.0)?)?.neg()?.broadcast_sub(log_std))?
                    .affine(1.0, -0.5 * (2.0 * PI).ln())?;
                Ok(lp.sum(D::Minus1)?)
            }
            Self::Categorical { logits } => {
                let log_p = log_softmax(logits, D::Minus1)?;
                let ix = action.to_dtype(DType::U32)?;
                Ok(log_p.gather(&ix, D::Minus1)?.squeeze(D::Minus1)?)
            }
        }
    }

    /// Entropy of the distribution of each state, `(batch_size,)`.
    pub fn entropy(&self) -> Result<Tensor> {
        match self {
            Self::Gaussian { mean, log_std } => {
                let h = log_std
                    .broadcast_as(mean.shape())?
                    .affine(1.0, 0.5 + 0.5 * (2.0 * PI).ln())?;
                Ok(h.sum(D::Minus1)?)
            }
            Self::Categorical { logits } => {
                let log_p = log_softmax(logits, D::Minus1)?;
                let p = softmax(logits, D::Minus1)?;
                Ok((p * log_p)?.sum(D::Minus1)?.neg()?)
            }
        }
    }

    /// Draws one action per state.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Tensor> {
        match self {
            Self::Gaussian { mean, log_std } => {
                let noise: Vec<f32> = (0..mean.elem_count())
                    .map(|_| rng.sample::<f64, _>(StandardNormal) as f32)
                    .collect();
                let noise = Tensor::from_vec(noise, mean.shape().clone(), mean.device())?
                    .to_dtype(mean.dtype())?;
                let std = log_std.exp()?;
                Ok(mean.add(&noise.broadcast_mul(&std)?)?)
            }
            Self::Categorical { logits } => {
                let probs: Vec<Vec<f32>> = softmax(logits, D::Minus1)?.to_vec2()?;
                let ixs = probs
                    .iter()
                    .map(|p| {
                        let dist = WeightedIndex::new(p)
                            .map_err(|e| anyhow!("cannot sample from {:?}: {}", p, e))?;
                        Ok(rng.sample(dist) as f32)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let n = ixs.len();
                Ok(Tensor::from_vec(ixs, (n, 1), logits.device())?)
            }
        }
    }

    /// The most likely action of each state: the mean or the argmax.
    pub fn mode(&self) -> Result<Tensor> {
        match self {
            Self::Gaussian { mean, .. } => Ok(mean.clone()),
            Self::Categorical { logits } => Ok(logits
                .argmax_keepdim(D::Minus1)?
                .to_dtype(DType::F32)?),
        }
    }
}
