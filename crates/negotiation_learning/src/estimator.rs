//! Frequency-based estimate of the counterpart's issue and value weights.
//!
//! Every domain issue gets an [`IssueEstimate`]: a scalar importance weight and a
//! table of per-value counters. The estimator raises an issue's weight whenever the
//! counterpart repeats that issue's value across consecutive offers, and raises a
//! value's counter every time the counterpart offers it.
//!
//! Raw counters are rescaled by [`IssueWeightEstimator::normalize`]:
//! - each issue's most-offered value maps to exactly `1.0`;
//! - issue weights sum to `1.0`.
//!
//! The utility of a bid under the current estimate is the weighted sum of its
//! per-issue value weights.

use crate::domain::{Bid, Domain};
use crate::error::{Error, Result};
use crate::offer_log::OfferLog;
use crate::types::IssueValue;
use std::collections::HashMap;

/// Initial counter for every declared value. Never exactly zero.
pub const VALUE_WEIGHT_EPSILON: f64 = 1e-10;

/// Initial raw weight of every issue, before the construction-time normalization.
pub const INITIAL_ISSUE_WEIGHT: f64 = 1.0;

/// The estimate kept for one issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueEstimate {
    /// Estimated importance of the issue to the counterpart.
    pub weight: f64,
    value_weights: HashMap<IssueValue, f64>,
}

impl IssueEstimate {
    /// Creates an estimate with every value seeded at [`VALUE_WEIGHT_EPSILON`].
    pub fn new<'a>(values: impl IntoIterator<Item = &'a IssueValue>) -> Self {
        Self {
            weight: INITIAL_ISSUE_WEIGHT,
            value_weights: values
                .into_iter()
                .map(|v| (v.clone(), VALUE_WEIGHT_EPSILON))
                .collect(),
        }
    }

    /// Counts one more observation of `value`.
    ///
    /// `None` is ignored, as is a value outside the declared value set; the table
    /// never grows new keys.
    pub fn update(&mut self, value: Option<&IssueValue>) {
        let Some(value) = value else {
            return;
        };

        match self.value_weights.get_mut(value) {
            Some(counter) => *counter += 1.0,
            None => log::warn!("Ignoring undeclared value '{}'", value),
        }
    }

    /// Returns the weight currently held for `value`.
    pub fn value_weight(&self, value: &IssueValue) -> Option<f64> {
        self.value_weights.get(value).copied()
    }

    /// Returns the full value-weight table.
    pub fn value_weights(&self) -> &HashMap<IssueValue, f64> {
        &self.value_weights
    }

    /// Largest value weight held by this issue.
    pub fn max_value_weight(&self) -> f64 {
        self.value_weights
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Weighted contribution of `value` to a bid's utility.
    ///
    /// A missing value contributes nothing.
    fn utility(&self, issue: &str, value: Option<&IssueValue>) -> Result<f64> {
        let Some(value) = value else {
            return Ok(0.0);
        };

        self.value_weights
            .get(value)
            .map(|w| self.weight * w)
            .ok_or_else(|| Error::MissingValue {
                issue: issue.to_string(),
                value: value.to_string(),
            })
    }
}

/// Issue and value weight estimator for one counterpart.
#[derive(Debug, Clone)]
pub struct IssueWeightEstimator {
    /// Records in domain enumeration order.
    issues: Vec<(String, IssueEstimate)>,
    /// Learning rate for issue-weight increments.
    alpha: f64,
}

impl IssueWeightEstimator {
    /// Builds epsilon-seeded records for every issue of `domain` and normalizes them
    /// once, so a fresh estimator weights every issue equally.
    pub fn new(domain: &Domain, alpha: f64) -> Result<Self> {
        let issues = domain
            .issues()
            .iter()
            .map(|spec| (spec.name.clone(), IssueEstimate::new(&spec.values)))
            .collect();

        let mut estimator = Self { issues, alpha };
        estimator.normalize()?;
        Ok(estimator)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the record for `issue`.
    pub fn issue(&self, issue: &str) -> Option<&IssueEstimate> {
        self.issues
            .iter()
            .find(|(name, _)| name == issue)
            .map(|(_, estimate)| estimate)
    }

    /// Iterates over `(issue, record)` in domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IssueEstimate)> {
        self.issues.iter().map(|(name, est)| (name.as_str(), est))
    }

    /// Sum of all issue weights.
    pub fn total_weight(&self) -> f64 {
        self.issues.iter().map(|(_, est)| est.weight).sum()
    }

    /// Counts every value `bid` offers.
    pub fn observe_values(&mut self, bid: &Bid) {
        for (name, estimate) in self.issues.iter_mut() {
            estimate.update(bid.value_for(name));
        }
    }

    /// Raises the weight of every issue whose value is the same in the two most
    /// recent offers of `log` by `alpha * (1 - 3t)`.
    ///
    /// The increment turns negative once `t > 1/3`, which lowers repeated issues'
    /// weights late in the session. Returns the number of issues touched; zero when
    /// the log holds fewer than two bids.
    pub fn update_issue_weights(&mut self, log: &OfferLog, t: f64) -> usize {
        let Some((prev, latest)) = log.last_pair() else {
            return 0;
        };

        let delta = self.alpha * (1.0 - t * 3.0);
        let mut touched = 0;

        for (name, estimate) in self.issues.iter_mut() {
            if prev.value_for(name) == latest.value_for(name) {
                estimate.weight += delta;
                touched += 1;
            }
        }

        log::trace!("Issue weights: {} repeated issue(s), delta {:.4}", touched, delta);
        touched
    }

    /// Rescales value weights so each issue's maximum is `1.0` and issue weights so
    /// they sum to `1.0`.
    ///
    /// Both denominators are checked before any record changes. A value-weight
    /// maximum that is not positive and finite, or an issue-weight total that is zero
    /// or non-finite, fails with [`Error::InvariantViolation`] and leaves the
    /// estimator untouched. A negative total is divided through like any other.
    pub fn normalize(&mut self) -> Result<()> {
        let mut maxima = Vec::with_capacity(self.issues.len());
        let mut total_issue_weight = 0.0;

        for (name, estimate) in &self.issues {
            total_issue_weight += estimate.weight;

            let max_val = estimate.max_value_weight();
            if !(max_val.is_finite() && max_val > 0.0) {
                return Err(Error::InvariantViolation(format!(
                    "issue '{}' has no positive value weight (max = {})",
                    name, max_val
                )));
            }
            maxima.push(max_val);
        }

        if total_issue_weight == 0.0 || !total_issue_weight.is_finite() {
            return Err(Error::InvariantViolation(format!(
                "issue weights sum to {}",
                total_issue_weight
            )));
        }

        for ((_, estimate), max_val) in self.issues.iter_mut().zip(maxima) {
            for w in estimate.value_weights.values_mut() {
                *w /= max_val;
            }
        }

        for (_, estimate) in self.issues.iter_mut() {
            estimate.weight /= total_issue_weight;
        }

        Ok(())
    }

    /// Estimated utility of `bid`: `Σ weight(issue) * value_weight(issue, value)`.
    ///
    /// `None` scores `0.0`. A value missing from an issue's table is an
    /// [`Error::MissingValue`].
    pub fn utility(&self, bid: Option<&Bid>) -> Result<f64> {
        let Some(bid) = bid else {
            return Ok(0.0);
        };

        let mut total = 0.0;
        for (name, estimate) in &self.issues {
            total += estimate.utility(name, bid.value_for(name))?;
        }
        Ok(total)
    }

    /// Like [`utility`](Self::utility), but scores an unknown value at the raw
    /// [`VALUE_WEIGHT_EPSILON`] weight instead of failing.
    pub fn utility_lenient(&self, bid: Option<&Bid>) -> f64 {
        let Some(bid) = bid else {
            return 0.0;
        };

        self.issues
            .iter()
            .map(|(name, estimate)| {
                match estimate.utility(name, bid.value_for(name)) {
                    Ok(u) => u,
                    Err(e) => {
                        log::warn!("{}; scoring it as unobserved", e);
                        estimate.weight * VALUE_WEIGHT_EPSILON
                    }
                }
            })
            .sum()
    }
}
