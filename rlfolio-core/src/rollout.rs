//! Rollout buffer and generalized advantage estimation.
//!
//! The buffer keeps the transitions of one rollout with index-aligned fields.
//! [`RolloutBuffer::compute_gae`] derives the discounted returns and the
//! advantages by the backward recursion
//!
//! ```text
//! delta_t  = reward_t + gamma * value_{t+1} - value_t
//! gae_t    = delta_t + gamma * tau * gae_{t+1}
//! return_t = gae_t + value_t
//! ```
//!
//! where `value_T` is the value of the state following the last transition.
mod base;
mod config;
mod minibatch;

pub use base::{RolloutBuffer, Transition};
pub use config::RolloutBufferConfig;
pub use minibatch::{Minibatch, Minibatches};
