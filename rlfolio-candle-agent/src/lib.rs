//! Agents of [`rlfolio_core`] implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`ppo`] - PPO over an actor-critic network, with Gaussian or categorical policies
//! * [`dqn`] - DQN over a Q-network with a uniform replay buffer
pub mod dist;
pub mod dqn;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod ppo;
pub mod util;
use serde::{Deserialize, Serialize};
pub use dist::{nan_logit_fallbacks, PolicyDist};
pub use model::{PolicyValueModel, SubModel1};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_device() -> anyhow::Result<()> {
        let device: candle_core::Device = Device::default().try_into()?;
        assert!(device.is_cpu());
        Ok(())
    }
}
