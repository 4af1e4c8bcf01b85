//! Policy.
use crate::env::State;
use anyhow::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A policy on the market environment.
///
/// Maps a state to the number of shares to trade. Agents implement it with
/// their deterministic (greedy or mean) action, used for evaluation.
pub trait Policy {
    /// Trade for the given state.
    fn sample(&mut self, state: &State) -> Result<f64>;
}

/// An object built from a serializable configuration.
pub trait Configurable {
    /// Configuration.
    type Config: Clone + DeserializeOwned;

    /// Builds the object.
    fn build(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Builds the object with the configuration in the YAML file of the given path.
    fn build_from_path(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        let rdr = std::io::BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Self::build(config)
    }
}
