//! Uniform replay buffer.
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Transitions sampled from [`ReplayBuffer`], flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    /// States, `len * state_dim` values.
    pub state: Vec<f32>,

    /// Indices of the actions.
    pub action: Vec<u32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Next states, `len * state_dim` values.
    pub next_state: Vec<f32>,
}

impl TransitionBatch {
    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.action.len()
    }

    /// Returns `true` for a batch without transitions.
    pub fn is_empty(&self) -> bool {
        self.action.is_empty()
    }
}

struct Item {
    state: Vec<f32>,
    action: u32,
    reward: f32,
    next_state: Vec<f32>,
}

/// Ring buffer of the latest `capacity` transitions.
pub struct ReplayBuffer {
    capacity: usize,
    items: Vec<Item>,
    i: usize,
    rng: SmallRng,
}

impl ReplayBuffer {
    /// Creates an empty buffer.
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
            i: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no transition is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stores a transition, overwriting the oldest one when full.
    pub fn push(&mut self, state: Vec<f32>, action: u32, reward: f32, next_state: Vec<f32>) {
        let item = Item {
            state,
            action,
            reward,
            next_state,
        };
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.i] = item;
        }
        self.i = (self.i + 1) % self.capacity;
    }

    /// Samples `size` transitions uniformly with replacement.
    pub fn batch(&mut self, size: usize) -> TransitionBatch {
        let ixs: Vec<usize> = (0..size)
            .map(|_| self.rng.gen_range(0..self.items.len()))
            .collect();

        TransitionBatch {
            state: ixs.iter().flat_map(|&i| self.items[i].state.iter().copied()).collect(),
            action: ixs.iter().map(|&i| self.items[i].action).collect(),
            reward: ixs.iter().map(|&i| self.items[i].reward).collect(),
            next_state: ixs
                .iter()
                .flat_map(|&i| self.items[i].next_state.iter().copied())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut buffer = ReplayBuffer::new(3, 0);
        for i in 0..5 {
            buffer.push(vec![i as f32, 0.0], i, i as f32, vec![i as f32 + 1.0, 0.0]);
        }
        assert_eq!(buffer.len(), 3);

        let batch = buffer.batch(50);
        assert_eq!(batch.len(), 50);
        assert_eq!(batch.state.len(), 100);
        assert!(batch.action.iter().all(|a| *a >= 2));
        for (k, a) in batch.action.iter().enumerate() {
            assert_eq!(batch.state[2 * k], *a as f32);
            assert_eq!(batch.reward[k], *a as f32);
            assert_eq!(batch.next_state[2 * k], *a as f32 + 1.0);
        }
    }
}
