//! State and action abstractions for Q-learning over bids.
//!
//! A [`StateProjection`] maps a bid onto a compact [`StateKey`]. Which projection a
//! model uses is picked by configuration ([`StateProjectionKind`]) rather than by
//! issue-name literals scattered through the code.

use crate::domain::{Bid, Domain};
use crate::types::IssueValue;
use serde::{Deserialize, Serialize};

/// The projected state of a bid: one optional value per projected issue, in
/// projection order. `None` marks an issue the bid does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey(pub Vec<Option<IssueValue>>);

/// The Q-learning action of a bid: its value on the domain's primary issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionKey(pub Option<IssueValue>);

impl ActionKey {
    /// The action `bid` takes on `primary_issue`.
    pub fn of(bid: &Bid, primary_issue: &str) -> Self {
        Self(bid.value_for(primary_issue).cloned())
    }
}

impl From<IssueValue> for ActionKey {
    fn from(v: IssueValue) -> Self {
        Self(Some(v))
    }
}

/// Maps a bid onto a compact state.
pub trait StateProjection: Send + Sync + std::fmt::Debug {
    /// Projects `bid` onto its state key.
    fn project(&self, bid: &Bid) -> StateKey;

    /// The issues this projection reads, in projection order.
    fn features(&self) -> &[String];
}

/// Projects a bid onto a fixed subset of issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSubset {
    issues: Vec<String>,
}

impl FeatureSubset {
    pub fn new(issues: Vec<String>) -> Self {
        Self { issues }
    }
}

impl StateProjection for FeatureSubset {
    fn project(&self, bid: &Bid) -> StateKey {
        StateKey(
            self.issues
                .iter()
                .map(|issue| bid.value_for(issue).cloned())
                .collect(),
        )
    }

    fn features(&self) -> &[String] {
        &self.issues
    }
}

/// Projects a bid onto every issue of the domain, in domain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullIssueVector {
    issues: Vec<String>,
}

impl FullIssueVector {
    pub fn new(domain: &Domain) -> Self {
        Self {
            issues: domain.issue_names().map(str::to_string).collect(),
        }
    }
}

impl StateProjection for FullIssueVector {
    fn project(&self, bid: &Bid) -> StateKey {
        StateKey(
            self.issues
                .iter()
                .map(|issue| bid.value_for(issue).cloned())
                .collect(),
        )
    }

    fn features(&self) -> &[String] {
        &self.issues
    }
}

/// Configuration-level choice of state projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateProjectionKind {
    /// A fixed feature subset, named by issue.
    Features(Vec<String>),
    /// The full issue vector of the domain.
    AllIssues,
}

impl Default for StateProjectionKind {
    /// The price/quantity pair.
    fn default() -> Self {
        StateProjectionKind::Features(vec!["price".to_string(), "quantity".to_string()])
    }
}

impl StateProjectionKind {
    /// Builds the projection for `domain`.
    ///
    /// Feature issues the domain does not declare are kept (they always project to
    /// `None`) but reported with a warning.
    pub fn build(&self, domain: &Domain) -> Box<dyn StateProjection> {
        match self {
            StateProjectionKind::Features(issues) => {
                for issue in issues {
                    if domain.values(issue).is_none() {
                        log::warn!(
                            "State feature '{}' is not an issue of domain '{}'",
                            issue,
                            domain.name
                        );
                    }
                }
                Box::new(FeatureSubset::new(issues.clone()))
            }
            StateProjectionKind::AllIssues => Box::new(FullIssueVector::new(domain)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::new("trade")
            .with_issue("price", [10, 20, 30])
            .with_issue("quantity", [1, 2, 3])
            .with_issue("delivery", ["slow", "fast"])
    }

    #[test]
    fn test_default_projection_reads_price_and_quantity() {
        let projection = StateProjectionKind::default().build(&domain());
        let bid = Bid::new()
            .with("price", 20)
            .with("quantity", 3)
            .with("delivery", "fast");

        assert_eq!(projection.features(), ["price", "quantity"]);
        assert_eq!(
            projection.project(&bid),
            StateKey(vec![Some(20.into()), Some(3.into())])
        );
    }

    #[test]
    fn test_all_issues_projection_follows_domain_order() {
        let projection = StateProjectionKind::AllIssues.build(&domain());
        let bid = Bid::new().with("delivery", "slow").with("price", 10);

        assert_eq!(
            projection.project(&bid),
            StateKey(vec![Some(10.into()), None, Some("slow".into())])
        );
    }

    #[test]
    fn test_unknown_feature_projects_to_none() {
        let kind = StateProjectionKind::Features(vec!["colour".to_string()]);
        let projection = kind.build(&domain());
        let bid = Bid::new().with("price", 10);
        assert_eq!(projection.project(&bid), StateKey(vec![None]));
    }

    #[test]
    fn test_action_key_reads_primary_issue() {
        let bid = Bid::new().with("price", 30);
        assert_eq!(ActionKey::of(&bid, "price"), ActionKey::from(IssueValue::from(30)));
        assert_eq!(ActionKey::of(&bid, "quantity"), ActionKey(None));
    }

    #[test]
    fn test_projection_kind_serialization() {
        let kind = StateProjectionKind::AllIssues;
        let json = serde_json::to_string(&kind).unwrap();
        let restored: StateProjectionKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, restored);
    }
}
