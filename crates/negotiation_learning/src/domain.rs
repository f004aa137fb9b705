//! Read-only collaborators: the negotiation domain, bids, and the session progress
//! signal.
//!
//! The learning core never owns the protocol that produces these. It only reads the
//! domain's issue enumeration, a bid's value per issue, and an elapsed-time fraction.

use crate::error::{Error, Result};
use crate::types::{IssueValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single offer: one value assigned to each negotiation issue.
///
/// Bids are immutable once built. The core stores them behind `Arc` and never
/// modifies them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bid {
    values: BTreeMap<String, IssueValue>,
}

impl Bid {
    /// Creates an empty bid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bid extended with `issue = value`.
    pub fn with(mut self, issue: &str, value: impl Into<IssueValue>) -> Self {
        self.values.insert(issue.to_string(), value.into());
        self
    }

    /// Builds a bid from `(issue, value)` pairs.
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<IssueValue>,
    {
        let values = pairs
            .into_iter()
            .map(|(issue, value)| (issue.to_string(), value.into()))
            .collect();
        Self { values }
    }

    /// Returns the value this bid assigns to `issue`, if any.
    pub fn value_for(&self, issue: &str) -> Option<&IssueValue> {
        self.values.get(issue)
    }

    /// Iterates over `(issue, value)` pairs in issue-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IssueValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of issues this bid assigns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bid assigns no issue.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One negotiable issue together with its discrete value set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSpec {
    /// The issue name.
    pub name: String,
    /// Every value the issue can take, in domain order.
    pub values: Vec<IssueValue>,
}

/// The negotiation domain: an ordered list of issues, each with a discrete value set.
///
/// The first issue in enumeration order is the *primary* issue used as the
/// Q-learning action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Human-readable domain name.
    pub name: String,
    issues: Vec<IssueSpec>,
}

impl Domain {
    /// Creates a domain with no issues.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            issues: Vec::new(),
        }
    }

    /// Appends an issue with its value set.
    pub fn with_issue<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<IssueValue>,
    {
        self.issues.push(IssueSpec {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Parses a domain from its JSON description and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let domain: Domain = serde_json::from_str(json)?;
        domain.validate()?;
        Ok(domain)
    }

    /// Checks that the domain is usable by the learning core.
    pub fn validate(&self) -> Result<()> {
        if self.issues.is_empty() {
            return Err(Error::Config(format!("domain '{}' has no issues", self.name)));
        }

        let mut names = HashSet::new();
        for issue in &self.issues {
            if !names.insert(issue.name.as_str()) {
                return Err(Error::Config(format!("duplicate issue '{}'", issue.name)));
            }
            if issue.values.is_empty() {
                return Err(Error::Config(format!("issue '{}' has no values", issue.name)));
            }
            let distinct: HashSet<&IssueValue> = issue.values.iter().collect();
            if distinct.len() != issue.values.len() {
                return Err(Error::Config(format!(
                    "issue '{}' lists a value more than once",
                    issue.name
                )));
            }
        }

        Ok(())
    }

    /// Returns the issues in enumeration order.
    pub fn issues(&self) -> &[IssueSpec] {
        &self.issues
    }

    /// Returns the issue names in enumeration order.
    pub fn issue_names(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|i| i.name.as_str())
    }

    /// Returns the value set of `issue`, if the domain declares it.
    pub fn values(&self, issue: &str) -> Option<&[IssueValue]> {
        self.issues
            .iter()
            .find(|i| i.name == issue)
            .map(|i| i.values.as_slice())
    }

    /// Returns the first enumerated issue.
    pub fn primary_issue(&self) -> Option<&IssueSpec> {
        self.issues.first()
    }
}

/// The session progress signal: how far the negotiation has advanced toward its
/// deadline, as a fraction in `[0, 1]`.
pub trait Progress: Send + Sync {
    /// Returns the elapsed-time fraction.
    fn elapsed(&self) -> f64;
}

fn clamp_fraction(t: f64) -> f64 {
    if t.is_nan() {
        0.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

/// A progress signal frozen at a single fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedProgress(pub f64);

impl Progress for FixedProgress {
    fn elapsed(&self) -> f64 {
        clamp_fraction(self.0)
    }
}

/// A progress signal the host advances explicitly.
///
/// Clones share the same underlying fraction, so the host can keep a handle while
/// the model owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualProgress {
    bits: Arc<AtomicU64>,
}

impl ManualProgress {
    /// Creates a handle starting at `t`.
    pub fn new(t: f64) -> Self {
        let progress = Self::default();
        progress.set(t);
        progress
    }

    /// Moves the shared fraction to `t` (clamped to `[0, 1]`).
    pub fn set(&self, t: f64) {
        self.bits
            .store(clamp_fraction(t).to_bits(), Ordering::Relaxed);
    }
}

impl Progress for ManualProgress {
    fn elapsed(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A wall-clock deadline: progress is the share of `duration_ms` elapsed since
/// `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedProgress {
    start: Timestamp,
    duration_ms: u64,
}

impl TimedProgress {
    /// Starts a deadline of `duration_ms` milliseconds now.
    pub fn start_now(duration_ms: u64) -> Self {
        Self::starting_at(Timestamp::now(), duration_ms)
    }

    /// Creates a deadline of `duration_ms` milliseconds that began at `start`.
    pub fn starting_at(start: Timestamp, duration_ms: u64) -> Self {
        Self { start, duration_ms }
    }

    /// Progress at an arbitrary instant.
    pub fn elapsed_at(&self, now: Timestamp) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        let elapsed_us = self.start.micros_until(now) as f64;
        clamp_fraction(elapsed_us / (self.duration_ms as f64 * 1000.0))
    }
}

impl Progress for TimedProgress {
    fn elapsed(&self) -> f64 {
        self.elapsed_at(Timestamp::now())
    }
}
