//! Sparse tabular Q-function over `(state, action)` pairs.

use crate::learning::projection::{ActionKey, StateKey};
use crate::types::IssueValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A composite key representing a state-action pair, used for indexing Q-values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateActionPair {
    pub state: StateKey,
    pub action: ActionKey,
}

impl StateActionPair {
    pub fn new(state: StateKey, action: ActionKey) -> Self {
        Self { state, action }
    }
}

/// One exported Q-table row, used when the table travels inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub state: StateKey,
    pub action: ActionKey,
    pub value: f64,
}

/// A sparse Q-table. Entries that were never written read as `0.0`.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    values: HashMap<StateActionPair, f64>,
    total_updates: u64,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from exported rows.
    pub fn from_entries(entries: impl IntoIterator<Item = QEntry>) -> Self {
        let values = entries
            .into_iter()
            .map(|e| (StateActionPair::new(e.state, e.action), e.value))
            .collect();
        Self {
            values,
            total_updates: 0,
        }
    }

    /// Gets the Q-value for a given state-action pair.
    pub fn get(&self, state: &StateKey, action: &ActionKey) -> f64 {
        let pair = StateActionPair::new(state.clone(), action.clone());
        self.values.get(&pair).copied().unwrap_or(0.0)
    }

    /// Gets the maximum Q-value for `state` across every value in `actions`.
    ///
    /// The full value set is scanned, so unwritten actions take part at `0.0`.
    pub fn max_q(&self, state: &StateKey, actions: &[IssueValue]) -> f64 {
        if actions.is_empty() {
            return 0.0;
        }

        actions
            .iter()
            .map(|a| self.get(state, &ActionKey(Some(a.clone()))))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// One-step Q-learning update:
    /// `Q(s,a) = (1 - lr) * Q(s,a) + lr * (r + df * max_a' Q(s',a'))`.
    ///
    /// With `learning_rate == 1.0` the previous value is discarded and the entry is
    /// set to `reward + discount_factor * max_a' Q(s',a')` exactly. Returns the new
    /// value.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        state: &StateKey,
        action: &ActionKey,
        reward: f64,
        next_state: &StateKey,
        available_actions: &[IssueValue],
        learning_rate: f64,
        discount_factor: f64,
    ) -> f64 {
        let prev_q = self.get(state, action);
        let max_next_q = self.max_q(next_state, available_actions);

        let new_q =
            (1.0 - learning_rate) * prev_q + learning_rate * (reward + discount_factor * max_next_q);

        self.values
            .insert(StateActionPair::new(state.clone(), action.clone()), new_q);
        self.total_updates += 1;
        new_q
    }

    /// Number of stored state-action pairs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of updates applied since construction.
    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    /// Exports every row, sorted by key so snapshots are deterministic.
    pub fn entries(&self) -> Vec<QEntry> {
        let mut rows: Vec<QEntry> = self
            .values
            .iter()
            .map(|(pair, value)| QEntry {
                state: pair.state.clone(),
                action: pair.action.clone(),
                value: *value,
            })
            .collect();
        rows.sort_by(|a, b| (&a.state, &a.action).cmp(&(&b.state, &b.action)));
        rows
    }

    /// Clears all learned Q-values.
    pub fn clear(&mut self) {
        self.values.clear();
        self.total_updates = 0;
    }
}
