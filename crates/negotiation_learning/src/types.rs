//! Core, general-purpose data types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A high-precision timestamp in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the current timestamp.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        let micros = (now.timestamp() as u64) * 1_000_000 + (now.timestamp_subsec_micros() as u64);
        Self(micros)
    }

    /// Microseconds elapsed between `self` and `later`, saturating at zero.
    pub fn micros_until(&self, later: Timestamp) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

/// A discrete value of a negotiation issue.
///
/// Values are opaque to the learning core: it only compares, hashes and orders them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueValue {
    /// An integer-labelled value, e.g. a price point.
    Integer(i64),
    /// A textual value, e.g. a colour or a delivery option.
    Text(String),
}

impl IssueValue {
    /// Returns the integer payload, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            IssueValue::Integer(i) => Some(*i),
            IssueValue::Text(_) => None,
        }
    }

    /// Returns the text payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IssueValue::Integer(_) => None,
            IssueValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for IssueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueValue::Integer(i) => write!(f, "{}", i),
            IssueValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for IssueValue {
    fn from(v: i64) -> Self {
        IssueValue::Integer(v)
    }
}

impl From<i32> for IssueValue {
    fn from(v: i32) -> Self {
        IssueValue::Integer(v as i64)
    }
}

impl From<String> for IssueValue {
    fn from(v: String) -> Self {
        IssueValue::Text(v)
    }
}

impl From<&str> for IssueValue {
    fn from(v: &str) -> Self {
        IssueValue::Text(v.to_string())
    }
}
