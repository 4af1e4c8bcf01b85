#![warn(missing_docs)]
//! Reinforcement learning for single-asset portfolio trading.
//!
//! * [`env`] - market environment with quadratic costs, rewards and the result table
//! * [`spaces`] - discretized actions, returns and holdings
//! * [`qtable`] - tabular Q-learning
//! * [`rollout`] - rollout buffer and generalized advantage estimation
//! * [`trainer`] - training loop of on-policy agents (PPO)
//! * [`benchmark`] - tabular, off-policy (DQN) and benchmark tracks on one series
//! * [`evaluator`] - out-of-sample evaluation against the optimal-tracking benchmark
//!
//! Agents plug into the loops through [`OnPolicyAgent`] and [`OffPolicyAgent`].
pub mod benchmark;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod qtable;
pub mod record;
pub mod rollout;
pub mod series;
pub mod spaces;
pub mod trainer;
pub mod util;

mod base;
pub use base::{
    ActOutput, Configurable, Experience, OffPolicyAgent, OnPolicyAgent, Policy, ValueEstimator,
};
pub use benchmark::{BenchmarkConfig, BenchmarkRunner};
pub use evaluator::{Evaluator, OutOfSampleEvaluator};
pub use trainer::{Trainer, TrainerConfig};
