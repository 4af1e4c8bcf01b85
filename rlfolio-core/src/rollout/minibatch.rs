use super::RolloutBuffer;

/// Transitions sampled from a [`RolloutBuffer`], flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Minibatch {
    /// States, `len * state_dim` values.
    pub state: Vec<f32>,

    /// Length of a flattened state.
    pub state_dim: usize,

    /// Actions, `len * action_dim` values.
    pub action: Vec<f32>,

    /// Length of an action.
    pub action_dim: usize,

    /// Log-probabilities of the actions under the behavior policy.
    pub log_prob: Vec<f32>,

    /// Discounted returns.
    pub returns: Vec<f32>,

    /// Advantages.
    pub advantage: Vec<f32>,
}

impl Minibatch {
    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.log_prob.len()
    }

    /// Returns `true` for a batch without transitions.
    pub fn is_empty(&self) -> bool {
        self.log_prob.is_empty()
    }
}

/// Iterator over the minibatches of one pass, see [`RolloutBuffer::iter_minibatches`].
///
/// The indices are drawn when the iterator is created; the minibatches are
/// assembled as they are requested.
pub struct Minibatches<'a> {
    buffer: &'a RolloutBuffer,
    ixs: Vec<usize>,
    batch_size: usize,
    pos: usize,
}

impl<'a> Minibatches<'a> {
    pub(super) fn new(buffer: &'a RolloutBuffer, ixs: Vec<usize>, batch_size: usize) -> Self {
        Self {
            buffer,
            ixs,
            batch_size,
            pos: 0,
        }
    }
}

impl<'a> Iterator for Minibatches<'a> {
    type Item = Minibatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + self.batch_size > self.ixs.len() {
            return None;
        }
        let ixs = &self.ixs[self.pos..self.pos + self.batch_size];
        self.pos += self.batch_size;
        Some(self.buffer.gather(ixs))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.ixs.len() - self.pos) / self.batch_size;
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for Minibatches<'a> {}
