//! PPO agent.
mod actor_critic;
mod base;
mod config;
pub use actor_critic::{ActorCritic, ActorCriticConfig};
pub use base::Ppo;
pub use config::PpoConfig;
