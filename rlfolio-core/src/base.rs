//! Traits connecting agents to the training loops.
mod agent;
mod policy;
pub use agent::{ActOutput, Experience, OffPolicyAgent, OnPolicyAgent, ValueEstimator};
pub use policy::{Configurable, Policy};
