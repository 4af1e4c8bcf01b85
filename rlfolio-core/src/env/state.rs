use std::collections::VecDeque;

/// State of the trading agents.
///
/// A fixed-length sequence of `(return, holding)` rows, most recent last.
/// The flat representation is a window of length one.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    rows: VecDeque<[f64; 2]>,
}

impl State {
    /// A single `(return, holding)` pair.
    pub fn flat(ret: f64, holding: f64) -> Self {
        Self {
            rows: VecDeque::from(vec![[ret, holding]]),
        }
    }

    /// A window of `(return, holding)` rows, oldest first.
    pub fn window(rows: impl IntoIterator<Item = [f64; 2]>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Most recent return.
    pub fn ret(&self) -> f64 {
        self.last()[0]
    }

    /// Most recent holding.
    pub fn holding(&self) -> f64 {
        self.last()[1]
    }

    fn last(&self) -> &[f64; 2] {
        &self.rows[self.rows.len() - 1]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `false` for any state built by the environment.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows, oldest first.
    pub fn rows(&self) -> impl Iterator<Item = &[f64; 2]> {
        self.rows.iter()
    }

    /// Drops the oldest row and appends `(ret, holding)`.
    pub fn shift(&self, ret: f64, holding: f64) -> Self {
        let mut rows = self.rows.clone();
        rows.pop_front();
        rows.push_back([ret, holding]);
        Self { rows }
    }

    /// Row-major flattening `[r_0, h_0, r_1, h_1, ...]`, the input of the networks.
    pub fn to_vec(&self) -> Vec<f32> {
        self.rows
            .iter()
            .flat_map(|row| [row[0] as f32, row[1] as f32])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_shift() {
        let state = State::window(vec![[0.1, 0.0], [0.2, 1.0], [0.3, 2.0]]);
        let next = state.shift(0.4, 5.0);

        assert_eq!(next.len(), 3);
        assert_eq!(next.ret(), 0.4);
        assert_eq!(next.holding(), 5.0);
        assert_eq!(
            next.rows().cloned().collect::<Vec<_>>(),
            vec![[0.2, 1.0], [0.3, 2.0], [0.4, 5.0]]
        );
        assert_eq!(next.to_vec(), vec![0.2, 1.0, 0.3, 2.0, 0.4, 5.0]);
    }

    #[test]
    fn test_flat_shift() {
        let state = State::flat(0.1, 3.0).shift(0.2, 4.0);
        assert_eq!(state, State::flat(0.2, 4.0));
    }
}
