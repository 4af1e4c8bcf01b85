//! Command-line runner of the rlfolio trading agents.
//!
//! The crates of the workspace:
//!
//! * [rlfolio-core](rlfolio_core) has the market environment, the tabular
//!   Q-learning agent, the rollout buffer, the training loop of on-policy agents
//!   and the benchmark loop running the tabular, DQN, optimal-tracking and
//!   Markowitz tracks side by side.
//! * [rlfolio-candle-agent](rlfolio_candle_agent) has the PPO and DQN agents
//!   based on [candle](https://crates.io/crates/candle-core).
//! * This crate reads a [`RunConfig`] from YAML and runs one realization of PPO
//!   training or of the benchmark per seed, see [`Runner`].
//!
//! Outputs of a realization are written under
//! `(out_dir)/(out_class)/(YYYYMMDD)_(model_name)/seed_(seed)`:
//!
//! * `Results_<N>.zip` - the result table after the run,
//! * `TestResults_<N>_iteration_<it>.zip` - out-of-sample result tables,
//! * `ckpt/` - checkpoints of the agents and the Q-table,
//! * `PPO_final_weights/`, `DQN_final_weights/`, `QTable<N>.zip` - final models.
mod config;
mod run;
mod signal;
pub use config::RunConfig;
pub use run::{Command, RunSummary, Runner};
pub use signal::install_ctrl_c;
