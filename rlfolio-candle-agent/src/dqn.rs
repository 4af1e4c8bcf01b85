//! DQN agent.
mod base;
mod config;
mod model;
mod replay_buffer;
pub use base::Dqn;
pub use config::{DqnConfig, TargetUpdate};
pub use model::{DqnModel, DqnModelConfig};
pub use replay_buffer::{ReplayBuffer, TransitionBatch};
