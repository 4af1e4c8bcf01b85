use super::{Minibatch, Minibatches, RolloutBufferConfig};
use crate::ValueEstimator;
use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// One step of a rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Flattened state.
    pub state: Vec<f32>,

    /// Action in the space of the policy distribution.
    pub action: Vec<f32>,

    /// Reward of the step.
    pub reward: f64,

    /// Log-probability of the action under the behavior policy.
    pub log_prob: f64,

    /// Value estimate of the state.
    pub value: f64,
}

/// Transitions of one rollout with the derived returns and advantages.
///
/// Index `i` of every field refers to the same transition. The buffer is
/// owned by the training loop and cleared with [`RolloutBuffer::reset`] at the
/// start of each rollout.
pub struct RolloutBuffer {
    gamma: f64,
    tau: f64,
    batch_size: usize,
    state: Vec<Vec<f32>>,
    action: Vec<Vec<f32>>,
    reward: Vec<f64>,
    log_prob: Vec<f64>,
    value: Vec<f64>,
    returns: Vec<f64>,
    advantage: Vec<f64>,
    next_value: Option<f64>,
    rng: StdRng,
}

impl RolloutBuffer {
    /// Builds an empty buffer.
    pub fn build(config: &RolloutBufferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gamma: config.gamma,
            tau: config.tau,
            batch_size: config.batch_size,
            state: vec![],
            action: vec![],
            reward: vec![],
            log_prob: vec![],
            value: vec![],
            returns: vec![],
            advantage: vec![],
            next_value: None,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Clears the transitions and the derived fields.
    pub fn reset(&mut self) {
        self.state.clear();
        self.action.clear();
        self.reward.clear();
        self.log_prob.clear();
        self.value.clear();
        self.returns.clear();
        self.advantage.clear();
        self.next_value = None;
    }

    /// Appends a transition.
    pub fn add(&mut self, t: Transition) {
        self.state.push(t.state);
        self.action.push(t.action);
        self.reward.push(t.reward);
        self.log_prob.push(t.log_prob);
        self.value.push(t.value);
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the buffer has no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Minibatch size used by [`RolloutBuffer::iter_minibatches`].
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Value estimates.
    pub fn values(&self) -> &[f64] {
        &self.value
    }

    /// Discounted returns, empty before [`RolloutBuffer::compute_gae`].
    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Advantages, empty before [`RolloutBuffer::compute_gae`].
    pub fn advantages(&self) -> &[f64] {
        &self.advantage
    }

    /// Computes the returns and advantages, bootstrapping from `next_value`.
    ///
    /// `next_value` is kept for [`RolloutBuffer::recompute_gae`].
    pub fn compute_gae(&mut self, next_value: f64) {
        let n = self.len();
        let mut returns = vec![0.0; n];
        let mut gae = 0.0;

        for t in (0..n).rev() {
            let v_next = if t + 1 < n { self.value[t + 1] } else { next_value };
            let delta = self.reward[t] + self.gamma * v_next - self.value[t];
            gae = delta + self.gamma * self.tau * gae;
            returns[t] = gae + self.value[t];
        }

        self.advantage = returns
            .iter()
            .zip(self.value.iter())
            .map(|(r, v)| r - v)
            .collect();
        self.returns = returns;
        self.next_value = Some(next_value);
    }

    /// Re-estimates the value of every buffered state with the current model.
    pub fn refresh_values<V: ValueEstimator + ?Sized>(&mut self, estimator: &mut V) -> Result<()> {
        let values = estimator.values(&self.state)?;
        if values.len() != self.state.len() {
            return Err(anyhow!(
                "{} values for {} states",
                values.len(),
                self.state.len()
            ));
        }
        self.value = values;
        Ok(())
    }

    /// Refreshes the values and recomputes the returns and advantages,
    /// bootstrapping from the `next_value` of the last [`RolloutBuffer::compute_gae`].
    pub fn recompute_gae<V: ValueEstimator + ?Sized>(&mut self, estimator: &mut V) -> Result<()> {
        let next_value = self
            .next_value
            .ok_or_else(|| anyhow!("recompute_gae called before compute_gae"))?;
        self.refresh_values(estimator)?;
        self.compute_gae(next_value);
        Ok(())
    }

    /// Minibatches of random transitions, sampled with replacement.
    ///
    /// Yields `len / batch_size` minibatches; the iterator cannot be restarted
    /// and each call advances the sampler. Fails unless the returns and
    /// advantages of every transition have been computed.
    pub fn iter_minibatches(&mut self, batch_size: usize) -> Result<Minibatches<'_>> {
        let n = self.len();
        if self.returns.len() != n || self.advantage.len() != n {
            return Err(anyhow!(
                "minibatches of {} transitions with {} returns, call compute_gae first",
                n,
                self.returns.len()
            ));
        }
        let n_batches = if batch_size == 0 { 0 } else { n / batch_size };
        let ixs = (0..n_batches * batch_size)
            .map(|_| self.rng.gen_range(0..n))
            .collect();
        Ok(Minibatches::new(self, ixs, batch_size.max(1)))
    }

    pub(super) fn gather(&self, ixs: &[usize]) -> Minibatch {
        let state_dim = self.state.first().map(|s| s.len()).unwrap_or(0);
        let action_dim = self.action.first().map(|a| a.len()).unwrap_or(0);

        Minibatch {
            state: ixs.iter().flat_map(|i| self.state[*i].iter().cloned()).collect(),
            state_dim,
            action: ixs.iter().flat_map(|i| self.action[*i].iter().cloned()).collect(),
            action_dim,
            log_prob: ixs.iter().map(|i| self.log_prob[*i] as f32).collect(),
            returns: ixs.iter().map(|i| self.returns[*i] as f32).collect(),
            advantage: ixs.iter().map(|i| self.advantage[*i] as f32).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f64, value: f64) -> Transition {
        Transition {
            state: vec![reward as f32, 0.0],
            action: vec![0.0],
            reward,
            log_prob: -1.0,
            value,
        }
    }

    fn buffer(gamma: f64, tau: f64, batch_size: usize) -> RolloutBuffer {
        let config = RolloutBufferConfig::default()
            .gamma(gamma)
            .tau(tau)
            .batch_size(batch_size);
        RolloutBuffer::build(&config).unwrap()
    }

    struct ConstValue(f64);

    impl ValueEstimator for ConstValue {
        fn values(&mut self, states: &[Vec<f32>]) -> Result<Vec<f64>> {
            Ok(vec![self.0; states.len()])
        }
    }

    #[test]
    fn test_one_step_gae() {
        let mut buffer = buffer(0.5, 0.9, 1);
        buffer.add(transition(1.0, 0.5));
        buffer.compute_gae(2.0);

        assert_eq!(buffer.advantages(), &[1.0 + 0.5 * 2.0 - 0.5]);
        assert_eq!(buffer.returns(), &[2.0]);
    }

    #[test]
    fn test_gae_degenerate_case() {
        // reward == (1 - gamma) * value keeps every TD error at zero
        let mut buffer = buffer(0.5, 0.95, 4);
        for _ in 0..10 {
            buffer.add(transition(1.0, 2.0));
        }
        buffer.compute_gae(2.0);

        assert!(buffer.advantages().iter().all(|a| *a == 0.0));
        assert!(buffer.returns().iter().all(|r| *r == 2.0));
    }

    #[test]
    fn test_gae_recursion() {
        let (gamma, tau) = (0.9, 0.8);
        let mut buffer = buffer(gamma, tau, 1);
        let rewards = [1.0, -0.5, 0.25];
        let values = [0.3, 0.1, -0.2];
        for (r, v) in rewards.iter().zip(values.iter()) {
            buffer.add(transition(*r, *v));
        }
        buffer.compute_gae(0.7);

        let d2 = rewards[2] + gamma * 0.7 - values[2];
        let d1 = rewards[1] + gamma * values[2] - values[1];
        let d0 = rewards[0] + gamma * values[1] - values[0];
        let g2 = d2;
        let g1 = d1 + gamma * tau * g2;
        let g0 = d0 + gamma * tau * g1;
        assert_eq!(buffer.returns(), &[g0 + values[0], g1 + values[1], g2 + values[2]]);
        assert_eq!(buffer.advantages()[1], (g1 + values[1]) - values[1]);
    }

    #[test]
    fn test_recompute_gae_keeps_next_value() -> Result<()> {
        let mut buffer = buffer(0.5, 1.0, 1);
        buffer.add(transition(1.0, 0.0));
        assert!(buffer.recompute_gae(&mut ConstValue(1.0)).is_err());

        buffer.compute_gae(4.0);
        buffer.recompute_gae(&mut ConstValue(1.0))?;
        assert_eq!(buffer.values(), &[1.0]);
        assert_eq!(buffer.advantages(), &[1.0 + 0.5 * 4.0 - 1.0]);
        Ok(())
    }

    #[test]
    fn test_minibatch_count_and_alignment() -> Result<()> {
        let mut buffer = buffer(0.9, 0.9, 4);
        for i in 0..10 {
            buffer.add(transition(i as f64, 0.0));
        }
        buffer.compute_gae(0.0);

        let batches: Vec<_> = buffer.iter_minibatches(4)?.collect();
        assert_eq!(batches.len(), 2);
        for batch in batches.iter() {
            assert_eq!(batch.len(), 4);
            assert_eq!(batch.state.len(), 8);
            assert_eq!(batch.state_dim, 2);
            assert_eq!(batch.action_dim, 1);
            // state[0] carries the reward of the transition
            for k in 0..4 {
                let i = batch.state[2 * k] as usize;
                assert_eq!(batch.returns[k], buffer.returns()[i] as f32);
            }
        }

        assert_eq!(buffer.iter_minibatches(3)?.len(), 3);
        assert_eq!(buffer.iter_minibatches(11)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_minibatches_require_gae() -> Result<()> {
        let mut buffer = buffer(0.9, 0.9, 2);
        for i in 0..4 {
            buffer.add(transition(i as f64, 0.0));
        }
        assert!(buffer.iter_minibatches(2).is_err());

        buffer.compute_gae(0.0);
        assert_eq!(buffer.iter_minibatches(2)?.count(), 2);

        // a transition added after the GAE pass has no return yet
        buffer.add(transition(4.0, 0.0));
        assert!(buffer.iter_minibatches(2).is_err());
        Ok(())
    }

    #[test]
    fn test_reset_clears() {
        let mut buffer = buffer(0.9, 0.9, 4);
        buffer.add(transition(1.0, 0.0));
        buffer.compute_gae(0.0);
        buffer.reset();
        assert!(buffer.is_empty());
        assert!(buffer.returns().is_empty());
    }
}
