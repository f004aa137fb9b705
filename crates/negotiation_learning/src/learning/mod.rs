//! Q-learning over the counterpart's offer sequence.
//!
//! Each new counterpart offer closes a transition `(previous bid → current bid)`.
//! The previous bid is projected onto a compact state, its value on the domain's
//! primary issue is the action, and the caller supplies the reward. The table keeps
//! no terminal state: every transition bootstraps from the next state's best value.
//!
//! ## Example
//!
//! ```rust
//! use negotiation_learning::learning::{ActionKey, QTable, StateKey};
//! use negotiation_learning::IssueValue;
//!
//! let mut table = QTable::new();
//! let prices: Vec<IssueValue> = vec![10.into(), 20.into(), 30.into()];
//!
//! let s = StateKey(vec![Some(10.into()), Some(1.into())]);
//! let next = StateKey(vec![Some(20.into()), Some(2.into())]);
//! let a = ActionKey(Some(10.into()));
//!
//! let q = table.update(&s, &a, 1.0, &next, &prices, 0.5, 0.9);
//! assert_eq!(q, 0.5);
//! assert_eq!(table.get(&next, &a), 0.0);
//! ```

pub mod projection;
pub mod q_table;

pub use projection::{
    ActionKey, FeatureSubset, FullIssueVector, StateKey, StateProjection, StateProjectionKind,
};
pub use q_table::{QEntry, QTable, StateActionPair};
