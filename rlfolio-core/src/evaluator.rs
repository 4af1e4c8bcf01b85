//! Evaluate [`Policy`].
use crate::{record::Record, Policy};
use anyhow::Result;
mod out_of_sample;
pub use out_of_sample::OutOfSampleEvaluator;

/// Evaluate [`Policy`].
pub trait Evaluator<P: Policy + ?Sized> {
    /// Evaluates the policy after `iteration` episodes or iterations of training.
    ///
    /// The caller of this method needs to handle the internal state of `policy`,
    /// like training/evaluation mode.
    fn evaluate(&mut self, policy: &mut P, iteration: usize) -> Result<Record>;
}
