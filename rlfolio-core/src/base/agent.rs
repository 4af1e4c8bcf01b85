//! Agent.
use super::Policy;
use crate::{env::State, record::Record, rollout::Minibatch};
use anyhow::Result;
use std::path::Path;

/// Estimates the value of flattened states.
pub trait ValueEstimator {
    /// Value of each state.
    fn values(&mut self, states: &[Vec<f32>]) -> Result<Vec<f64>>;
}

/// Output of [`OnPolicyAgent::act`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActOutput {
    /// Action in the space of the policy distribution, stored in the rollout.
    ///
    /// The raw Gaussian sample for a continuous policy, the index of the
    /// trade for a discrete one.
    pub action: Vec<f32>,

    /// Shares to trade.
    pub trade: f64,

    /// Log-probability of `action`.
    pub log_prob: f64,

    /// Value estimate of the state.
    pub value: f64,
}

/// An agent trained on its own rollouts, e.g. PPO.
pub trait OnPolicyAgent: Policy + ValueEstimator {
    /// Sets the agent to training mode.
    fn train(&mut self);

    /// Sets the agent to evaluation mode.
    fn eval(&mut self);

    /// Returns `true` in training mode.
    fn is_train(&self) -> bool;

    /// Samples an action from the current policy.
    fn act(&mut self, state: &State) -> Result<ActOutput>;

    /// Performs one optimization step on a minibatch and returns the losses.
    fn opt_minibatch(&mut self, batch: &Minibatch) -> Result<Record>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}

/// One transition of an off-policy agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    /// Flattened state.
    pub state: Vec<f32>,

    /// Shares traded.
    pub trade: f64,

    /// Reward of the step.
    pub reward: f64,

    /// Flattened next state.
    pub next_state: Vec<f32>,
}

/// An agent trained from a replay buffer, e.g. DQN.
pub trait OffPolicyAgent: Policy {
    /// Epsilon-greedy trade.
    fn eps_greedy(&mut self, state: &State, epsilon: f64) -> Result<f64>;

    /// Stores a transition in the replay buffer of the agent.
    fn push(&mut self, experience: Experience) -> Result<()>;

    /// Performs an optimization step at iteration `iter` of the loop.
    ///
    /// Returns `None` while the agent is warming up.
    fn opt(&mut self, iter: usize) -> Result<Option<Record>>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
