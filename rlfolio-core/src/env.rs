//! Market environment.
//!
//! [`MarketEnv`] owns the driving series and the [`ResultTable`]. Learned
//! policies step through [`MarketEnv::step`], the tabular agent through
//! [`MarketEnv::discrete_step`] and the benchmarks through
//! [`MarketEnv::opt_step`] and [`MarketEnv::mv_step`]. All of them return a
//! [`TrackResult`] that can be written to the table with
//! [`MarketEnv::store_results`].
mod base;
mod config;
mod results;
mod reward;
mod state;

pub use base::{MarketEnv, OptState, OutputKind};
pub use config::{MarketEnvConfig, StateRepr};
pub use results::ResultTable;
pub use reward::{PolicyTag, RewardBreakdown, TrackResult};
pub use state::State;
