//! Opponent-keyed knowledge that survives between sessions.
//!
//! [`LearnedData`] is a flat mapping from string keys to primitive values; nothing
//! richer can be stored, so a snapshot never carries arbitrary object graphs. On
//! disk it travels inside a versioned [`Snapshot`] envelope that is validated before
//! use.

use crate::learning::QEntry;
use crate::persistence::PersistenceError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Well-known keys written by the negotiation session.
pub mod keys {
    /// Whether the last session ended in agreement.
    pub const AGREEMENT_REACHED: &str = "agreement_reached";
    /// Whether the counterpart was the one accepting.
    pub const OPPONENT_ACCEPTED: &str = "opponent_accepted";
    /// Elapsed-time fraction at which the agreement was reached.
    pub const ACCEPTANCE_TIME: &str = "acceptance_time";
    /// Estimated counterpart utility of the accepted bid.
    pub const ACCEPTED_UTILITY: &str = "accepted_utility";
    /// Number of sessions with this counterpart that ended in agreement.
    pub const AGREEMENT_COUNT: &str = "agreement_count";
    /// Number of sessions played against this counterpart.
    pub const SESSION_COUNT: &str = "session_count";
    /// Number of counterpart offers received in the last session.
    pub const RECEIVED_BID_COUNT: &str = "received_bid_count";
}

/// A primitive learned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LearnedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl LearnedValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LearnedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LearnedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LearnedValue::Int(i) => Some(*i as f64),
            LearnedValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LearnedValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for LearnedValue {
    fn from(v: bool) -> Self {
        LearnedValue::Bool(v)
    }
}

impl From<i64> for LearnedValue {
    fn from(v: i64) -> Self {
        LearnedValue::Int(v)
    }
}

impl From<f64> for LearnedValue {
    fn from(v: f64) -> Self {
        LearnedValue::Float(v)
    }
}

impl From<String> for LearnedValue {
    fn from(v: String) -> Self {
        LearnedValue::Text(v)
    }
}

impl From<&str> for LearnedValue {
    fn from(v: &str) -> Self {
        LearnedValue::Text(v.to_string())
    }
}

/// String-keyed learned facts about one counterpart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedData {
    entries: BTreeMap<String, LearnedValue>,
}

impl LearnedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&LearnedValue> {
        self.entries.get(key)
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: &str, value: impl Into<LearnedValue>) -> Option<LearnedValue> {
        self.entries.insert(key.to_string(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<LearnedValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Adds one to the integer counter at `key` (missing or non-integer entries start
    /// from zero, `i64::MAX` stays put) and returns the new count.
    pub fn increment(&mut self, key: &str) -> i64 {
        let next = self
            .get(key)
            .and_then(LearnedValue::as_i64)
            .unwrap_or(0)
            .saturating_add(1);
        self.insert(key, next);
        next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LearnedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The on-disk envelope around one counterpart's learned data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layout version; must equal [`SNAPSHOT_VERSION`] to be accepted.
    pub version: u32,
    /// Counterpart identity the snapshot was written for.
    pub opponent_id: String,
    /// When the snapshot was written.
    pub saved_at: Timestamp,
    /// The learned facts.
    pub data: LearnedData,
    /// Q-table rows, empty unless Q-table persistence is enabled.
    pub q_values: Vec<QEntry>,
}

impl Snapshot {
    /// Wraps `data` for `opponent_id` at the current version and time.
    pub fn new(opponent_id: &str, data: LearnedData, q_values: Vec<QEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            opponent_id: opponent_id.to_string(),
            saved_at: Timestamp::now(),
            data,
            q_values,
        }
    }

    /// Rejects snapshots of another version, written for another counterpart, or
    /// holding non-finite numbers.
    pub fn validate(&self, expected_opponent: &str) -> Result<(), PersistenceError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::InvalidFormat(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        if self.opponent_id != expected_opponent {
            return Err(PersistenceError::InvalidFormat(format!(
                "snapshot belongs to '{}', not '{}'",
                self.opponent_id, expected_opponent
            )));
        }

        for (key, value) in self.data.iter() {
            if let LearnedValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(PersistenceError::InvalidFormat(format!(
                        "non-finite value under '{}'",
                        key
                    )));
                }
            }
        }

        if self.q_values.iter().any(|e| !e.value.is_finite()) {
            return Err(PersistenceError::InvalidFormat(
                "non-finite Q-value".to_string(),
            ));
        }

        Ok(())
    }
}
