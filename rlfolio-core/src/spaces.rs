//! Discrete value sets of returns, holdings and actions.
//!
//! The tabular agent works on a grid of `(return, holding)` states and a finite
//! set of actions. Grids are built as `start + i * step` with exact comparisons,
//! so that integer-valued configurations yield exactly representable members.
use crate::error::RlfolioError;
use serde::{Deserialize, Serialize};

/// Output type of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// Gaussian policy over a bounded range of trades.
    Continuous,

    /// Categorical policy over the values of an [`ActionSpace`].
    Discrete,
}

/// Common operations of the finite ordered sets.
pub trait DiscreteSpace {
    /// Members of the set in increasing order.
    fn values(&self) -> &[f64];

    /// Cardinality of the set.
    fn len(&self) -> usize {
        self.values().len()
    }

    /// Returns `true` if the set has no member.
    fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Exact membership, without tolerance.
    fn contains(&self, x: f64) -> bool {
        self.values().iter().any(|v| *v == x)
    }

    /// Position of an exact member.
    fn index_of(&self, x: f64) -> Option<usize> {
        self.values().iter().position(|v| *v == x)
    }

    /// Member closest to `x` by absolute difference.
    ///
    /// An exact midpoint between two members resolves to the member of smaller
    /// magnitude; if both have the same magnitude the lower index wins.
    fn nearest(&self, x: f64) -> f64 {
        self.values()[nearest_index(self.values(), x)]
    }
}

// Ties prefer the smaller magnitude, not the first index, so that a midpoint
// such as -0.5 on a unit grid snaps to 0 rather than -1.
pub(crate) fn nearest_index(values: &[f64], x: f64) -> usize {
    let mut best = 0;
    let mut best_d = (values[0] - x).abs();

    for (i, v) in values.iter().enumerate().skip(1) {
        let d = (v - x).abs();
        if d < best_d || (d == best_d && v.abs() < values[best].abs()) {
            best = i;
            best_d = d;
        }
    }
    best
}

/// `start, start + step, ...` up to and including `stop` when hit exactly.
fn grid(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, RlfolioError> {
    if !(step > 0.0) || !start.is_finite() || !stop.is_finite() {
        return Err(RlfolioError::InvalidConfig(format!(
            "cannot build a grid from {} to {} with step {}",
            start, stop, step
        )));
    }

    let mut values = vec![];
    let mut i = 0usize;
    loop {
        let v = start + (i as f64) * step;
        if v > stop {
            break;
        }
        values.push(v);
        i += 1;
    }
    Ok(values)
}

/// Set of trades available to discrete policies.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    values: Vec<f64>,
}

impl ActionSpace {
    /// Symmetric range `[-half_width, half_width]` subsampled by `step`.
    ///
    /// The zero trade is removed when `zero_action` is `false`.
    pub fn new(half_width: f64, step: f64, zero_action: bool) -> Result<Self, RlfolioError> {
        let mut values = grid(-half_width, half_width, step)?;
        if !zero_action {
            values.retain(|v| *v != 0.0);
        }
        if values.is_empty() {
            return Err(RlfolioError::InvalidConfig("empty action space".into()));
        }
        Ok(Self { values })
    }

    /// Output dimension of a policy over this space.
    ///
    /// A continuous policy emits one real number, a discrete one a logit per member.
    pub fn n_actions(&self, policy_type: PolicyType) -> usize {
        match policy_type {
            PolicyType::Continuous => 1,
            PolicyType::Discrete => self.values.len(),
        }
    }

    /// Member at position `ix`.
    pub fn value(&self, ix: usize) -> f64 {
        self.values[ix]
    }
}

impl DiscreteSpace for ActionSpace {
    fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Discretized returns, `(-n_ticks ..= n_ticks) * tick`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSpace {
    values: Vec<f64>,
}

impl ReturnSpace {
    /// Builds the space from the number of ticks on each side of zero and the tick size.
    pub fn new(n_ticks: usize, tick: f64) -> Result<Self, RlfolioError> {
        if !(tick > 0.0) {
            return Err(RlfolioError::InvalidConfig(format!(
                "return tick must be positive, got {}",
                tick
            )));
        }
        let n = n_ticks as i64;
        let values = (-n..=n).map(|i| (i as f64) * tick).collect();
        Ok(Self { values })
    }
}

impl DiscreteSpace for ReturnSpace {
    fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Discretized holdings, `[-half_width, half_width]` subsampled by `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingSpace {
    values: Vec<f64>,
}

impl HoldingSpace {
    /// Builds the space.
    pub fn new(half_width: f64, step: f64) -> Result<Self, RlfolioError> {
        let values = grid(-half_width, half_width, step)?;
        if values.is_empty() {
            return Err(RlfolioError::InvalidConfig("empty holding space".into()));
        }
        Ok(Self { values })
    }
}

impl DiscreteSpace for HoldingSpace {
    fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Range of trades of a continuous policy.
///
/// Maps a normalized output in `[-1, 1]` (after `tanh`) to `[min, max]`, with
/// `min < max`. Ranges read from a configuration file are checked with
/// [`ContinuousActionRange::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ContinuousActionRange {
    /// Lower bound of the trade.
    pub min: f64,

    /// Upper bound of the trade.
    pub max: f64,
}

impl ContinuousActionRange {
    /// Range `[min, max]`, rejecting empty and unbounded ranges.
    pub fn new(min: f64, max: f64) -> Result<Self, RlfolioError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Symmetric range `[-bound, bound]`, `bound > 0`.
    pub fn symmetric(bound: f64) -> Result<Self, RlfolioError> {
        Self::new(-bound, bound)
    }

    /// Checks `min < max` with both bounds finite.
    pub fn validate(&self) -> Result<(), RlfolioError> {
        if !(self.min < self.max) || !self.min.is_finite() || !self.max.is_finite() {
            return Err(RlfolioError::InvalidConfig(format!(
                "invalid continuous action range [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }

    fn is_symmetric(&self) -> bool {
        self.min == -self.max
    }

    /// Maps `x` in `[-1, 1]` to the range.
    pub fn unscale(&self, x: f64) -> f64 {
        if self.is_symmetric() {
            self.max * x
        } else {
            self.min + (x + 1.0) * (self.max - self.min) / 2.0
        }
    }

    /// Inverse of [`ContinuousActionRange::unscale`].
    pub fn scale(&self, y: f64) -> f64 {
        if self.is_symmetric() {
            y / self.max
        } else {
            2.0 * (y - self.min) / (self.max - self.min) - 1.0
        }
    }

    /// Trade of a raw (unbounded) policy sample: `unscale(tanh(raw))`.
    pub fn from_raw(&self, raw: f64) -> f64 {
        self.unscale(raw.tanh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_action_space_values() -> Result<()> {
        let space = ActionSpace::new(10.0, 5.0, true)?;
        assert_eq!(space.values(), &[-10.0, -5.0, 0.0, 5.0, 10.0]);
        assert_eq!(space.n_actions(PolicyType::Discrete), 5);
        assert_eq!(space.n_actions(PolicyType::Continuous), 1);

        let space = ActionSpace::new(10.0, 5.0, false)?;
        assert_eq!(space.values(), &[-10.0, -5.0, 5.0, 10.0]);
        assert!(!space.contains(0.0));

        // The upper bound is included only when hit exactly
        let space = ActionSpace::new(5.0, 3.0, true)?;
        assert_eq!(space.values(), &[-5.0, -2.0, 1.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_invalid_spaces() {
        assert!(ActionSpace::new(1.0, 0.0, true).is_err());
        assert!(ActionSpace::new(0.0, 1.0, false).is_err());
        assert!(ReturnSpace::new(3, -0.1).is_err());
    }

    #[test]
    fn test_return_space_contains_exact() -> Result<()> {
        let space = ReturnSpace::new(2, 0.5)?;
        assert_eq!(space.values(), &[-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(space.contains(0.5));
        assert!(!space.contains(0.5 + 1e-12));
        Ok(())
    }

    #[test]
    fn test_nearest_tie_break() -> Result<()> {
        let space = ReturnSpace::new(2, 1.0)?;
        assert_eq!(space.nearest(1.6), 2.0);
        assert_eq!(space.nearest(-0.5), 0.0);
        assert_eq!(space.nearest(0.5), 0.0);
        assert_eq!(space.nearest(1.5), 1.0);
        assert_eq!(space.nearest(-1.5), -1.0);
        assert_eq!(space.nearest(-7.0), -2.0);
        Ok(())
    }

    #[test]
    fn test_nearest_equal_magnitude_takes_first() {
        let values = [-1.0, 1.0];
        assert_eq!(nearest_index(&values, 0.0), 0);
    }

    #[test]
    fn test_nearest_holding_midpoint() -> Result<()> {
        // argmin over the grid would pick -1.0, the first of the two nearest
        let space = HoldingSpace::new(2.0, 1.0)?;
        assert_eq!(space.nearest(-0.5), 0.0);
        assert_eq!(space.index_of(space.nearest(-0.5)), Some(2));
        assert_eq!(space.nearest(-1.5), -1.0);
        Ok(())
    }

    #[test]
    fn test_continuous_range() -> Result<()> {
        let range = ContinuousActionRange::symmetric(20.0)?;
        assert_eq!(range.unscale(0.5), 10.0);
        assert_eq!(range.scale(10.0), 0.5);
        assert_eq!(range.from_raw(0.0), 0.0);

        let range = ContinuousActionRange::new(0.0, 4.0)?;
        assert_eq!(range.unscale(-1.0), 0.0);
        assert_eq!(range.unscale(1.0), 4.0);
        assert_eq!(range.scale(range.unscale(0.25)), 0.25);
        Ok(())
    }

    #[test]
    fn test_degenerate_continuous_range() -> Result<()> {
        assert!(ContinuousActionRange::new(1.0, 1.0).is_err());
        assert!(ContinuousActionRange::new(2.0, -2.0).is_err());
        assert!(ContinuousActionRange::new(0.0, f64::INFINITY).is_err());
        assert!(ContinuousActionRange::symmetric(0.0).is_err());
        assert!(ContinuousActionRange::symmetric(-1.0).is_err());

        let range: ContinuousActionRange = serde_yaml::from_str("min: 3.0\nmax: 3.0\n")?;
        assert!(range.validate().is_err());
        Ok(())
    }
}
