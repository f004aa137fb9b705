//! The opponent model: issue-weight estimation plus Q-learning over the
//! counterpart's offer sequence.
//!
//! ## Architecture
//!
//! ```text
//! counterpart offer
//!        │
//!        ▼
//! ┌──────────────┐   last two   ┌──────────────────────┐
//! │  Offer Log   │─────────────►│ IssueWeightEstimator │──► get_utility(bid)
//! └──────┬───────┘              └──────────────────────┘
//!        │ (prev, curr)
//!        ▼
//! ┌──────────────┐
//! │   Q-table    │  Q(s,a) ← (1-lr)·Q(s,a) + lr·(r + df·max Q(s',·))
//! └──────────────┘
//! ```

use crate::config::ModelConfig;
use crate::domain::{Bid, Domain, Progress};
use crate::error::{Error, Result};
use crate::estimator::{IssueEstimate, IssueWeightEstimator};
use crate::learning::{ActionKey, QEntry, QTable, StateKey, StateProjection};
use crate::offer_log::OfferLog;
use crate::types::IssueValue;
use std::sync::Arc;

/// Learned model of one counterpart within one session.
pub struct OpponentModel {
    domain: Domain,
    config: ModelConfig,
    progress: Box<dyn Progress>,
    offers: OfferLog,
    estimator: IssueWeightEstimator,
    projection: Box<dyn StateProjection>,
    q_table: QTable,
    primary_issue: String,
    primary_values: Vec<IssueValue>,
}

impl std::fmt::Debug for OpponentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpponentModel")
            .field("domain", &self.domain.name)
            .field("offers", &self.offers.len())
            .field("estimator", &self.estimator)
            .field("projection", &self.projection)
            .field("q_entries", &self.q_table.len())
            .finish_non_exhaustive()
    }
}

impl OpponentModel {
    /// Creates a model for `domain`, reading session progress from `progress`.
    ///
    /// Every issue starts at equal weight and every value at the same (epsilon)
    /// preference; the Q-table starts empty.
    pub fn new(
        domain: Domain,
        progress: impl Progress + 'static,
        config: ModelConfig,
    ) -> Result<Self> {
        domain.validate()?;
        config.validate()?;

        let primary = domain
            .primary_issue()
            .ok_or_else(|| Error::Config("domain has no primary issue".to_string()))?;
        let primary_issue = primary.name.clone();
        let primary_values = primary.values.clone();

        let estimator = IssueWeightEstimator::new(&domain, config.alpha)?;
        let projection = config.state_projection.build(&domain);

        log::debug!(
            "Opponent model for '{}': {} issues, primary '{}', state features {:?}",
            domain.name,
            domain.issues().len(),
            primary_issue,
            projection.features()
        );

        Ok(Self {
            domain,
            config,
            progress: Box::new(progress),
            offers: OfferLog::new(),
            estimator,
            projection,
            q_table: QTable::new(),
            primary_issue,
            primary_values,
        })
    }

    /// Folds one counterpart transition `prev → curr` into the model.
    ///
    /// Does nothing unless both bids are present. Otherwise `curr` is appended to
    /// the offer log and counted, issue weights are updated from the last two logged
    /// offers, and one Q-learning update is applied with `reward`.
    pub fn update(
        &mut self,
        prev: Option<&Arc<Bid>>,
        curr: Option<&Arc<Bid>>,
        reward: f64,
        learning_rate: f64,
        discount_factor: f64,
    ) -> Result<()> {
        let (Some(prev), Some(curr)) = (prev, curr) else {
            return Ok(());
        };

        self.offers.append(Arc::clone(curr));
        self.estimator.observe_values(curr);
        self.update_issue_weights();
        let q = self.q_learning_update(prev, curr, reward, learning_rate, discount_factor);

        log::debug!(
            "Offer #{} folded in: reward {:.3}, Q(prev) = {:.4}",
            self.offers.len(),
            reward,
            q
        );

        if self.config.auto_normalize {
            self.estimator.normalize()?;
        }
        Ok(())
    }

    /// Single ingestion point for a newly received counterpart offer.
    ///
    /// The first offer only seeds the log and the value counters; every later offer
    /// is folded in as a transition from the previously received one.
    pub fn observe(
        &mut self,
        bid: Arc<Bid>,
        reward: f64,
        learning_rate: f64,
        discount_factor: f64,
    ) -> Result<()> {
        match self.offers.latest().cloned() {
            Some(prev) => self.update(
                Some(&prev),
                Some(&bid),
                reward,
                learning_rate,
                discount_factor,
            ),
            None => {
                self.estimator.observe_values(&bid);
                self.offers.append(bid);
                if self.config.auto_normalize {
                    self.estimator.normalize()?;
                }
                Ok(())
            }
        }
    }

    /// Raises the weight of issues the counterpart repeated across its last two
    /// offers, scaled by the current elapsed-time fraction. No-op with fewer than two
    /// offers. Returns the number of issues touched.
    pub fn update_issue_weights(&mut self) -> usize {
        let t = self.progress.elapsed();
        self.estimator.update_issue_weights(&self.offers, t)
    }

    /// Applies one Q-learning update for the transition `prev → curr` and returns
    /// the new `Q(state(prev), action(prev))`.
    ///
    /// A non-finite reward or rate skips the update and returns the unchanged value.
    pub fn q_learning_update(
        &mut self,
        prev: &Bid,
        curr: &Bid,
        reward: f64,
        learning_rate: f64,
        discount_factor: f64,
    ) -> f64 {
        let prev_state = self.state_of(prev);
        let prev_action = self.action_of(prev);

        if !(reward.is_finite() && learning_rate.is_finite() && discount_factor.is_finite()) {
            log::warn!(
                "Skipping Q-update with non-finite input (reward {}, lr {}, df {})",
                reward,
                learning_rate,
                discount_factor
            );
            return self.q_table.get(&prev_state, &prev_action);
        }

        let curr_state = self.state_of(curr);

        self.q_table.update(
            &prev_state,
            &prev_action,
            reward,
            &curr_state,
            &self.primary_values,
            learning_rate,
            discount_factor,
        )
    }

    /// Rescales the weight estimates; see [`IssueWeightEstimator::normalize`].
    pub fn normalize(&mut self) -> Result<()> {
        self.estimator.normalize()
    }

    /// Estimated counterpart utility of `bid`; `0.0` for `None`.
    ///
    /// Fails with [`Error::MissingValue`] on a value the domain never declared.
    pub fn get_utility(&self, bid: Option<&Bid>) -> Result<f64> {
        self.estimator.utility(bid)
    }

    /// Estimated utility that scores unknown values at the raw epsilon weight
    /// instead of failing.
    pub fn utility_lenient(&self, bid: Option<&Bid>) -> f64 {
        self.estimator.utility_lenient(bid)
    }

    /// Projects `bid` onto its Q-learning state.
    pub fn state_of(&self, bid: &Bid) -> StateKey {
        self.projection.project(bid)
    }

    /// The Q-learning action of `bid`: its value on the primary issue.
    pub fn action_of(&self, bid: &Bid) -> ActionKey {
        ActionKey::of(bid, &self.primary_issue)
    }

    /// `Q(state(bid), action(bid))`.
    pub fn q_value(&self, bid: &Bid) -> f64 {
        self.q_table.get(&self.state_of(bid), &self.action_of(bid))
    }

    /// Replaces the Q-table with rows restored from a previous session.
    pub fn restore_q_table(&mut self, entries: impl IntoIterator<Item = QEntry>) {
        self.q_table = QTable::from_entries(entries);
    }

    /// Current weight of `issue`.
    pub fn issue_weight(&self, issue: &str) -> Option<f64> {
        self.estimator.issue(issue).map(|i| i.weight)
    }

    /// Current weight of `value` on `issue`.
    pub fn value_weight(&self, issue: &str, value: &IssueValue) -> Option<f64> {
        self.estimator
            .issue(issue)
            .and_then(|i| i.value_weight(value))
    }

    /// Per-issue estimates in domain order.
    pub fn issues(&self) -> impl Iterator<Item = (&str, &IssueEstimate)> {
        self.estimator.iter()
    }

    /// Elapsed-time fraction reported by the progress signal.
    pub fn elapsed(&self) -> f64 {
        self.progress.elapsed()
    }

    pub fn estimator(&self) -> &IssueWeightEstimator {
        &self.estimator
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    /// The counterpart's offers, in arrival order.
    pub fn offers(&self) -> &OfferLog {
        &self.offers
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Name of the issue whose value is the Q-learning action.
    pub fn primary_issue(&self) -> &str {
        &self.primary_issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FixedProgress, ManualProgress};
    use crate::learning::StateProjectionKind;

    const TOLERANCE: f64 = 1e-9;

    fn trade_domain() -> Domain {
        Domain::new("trade")
            .with_issue("price", [10, 20, 30])
            .with_issue("quantity", [1, 2, 3])
    }

    fn bid(price: i64, quantity: i64) -> Arc<Bid> {
        Arc::new(Bid::new().with("price", price).with("quantity", quantity))
    }

    fn model_at(t: f64) -> OpponentModel {
        OpponentModel::new(trade_domain(), FixedProgress(t), ModelConfig::default()).unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_inputs() {
        assert!(OpponentModel::new(Domain::new("empty"), FixedProgress(0.0), ModelConfig::default()).is_err());
        assert!(OpponentModel::new(
            trade_domain(),
            FixedProgress(0.0),
            ModelConfig::default().with_alpha(-1.0)
        )
        .is_err());
    }

    #[test]
    fn test_update_requires_both_bids() {
        let mut model = model_at(0.1);
        model.update(None, Some(&bid(20, 2)), 1.0, 0.5, 0.9).unwrap();
        model.update(Some(&bid(20, 2)), None, 1.0, 0.5, 0.9).unwrap();

        assert!(model.offers().is_empty());
        assert!(model.q_table().is_empty());
        assert!((model.issue_weight("price").unwrap() - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_repeated_offer_scenario() {
        let mut model = model_at(0.1);
        let first = bid(20, 2);
        let second = bid(20, 2);

        model.observe(Arc::clone(&first), 0.0, 0.5, 0.9).unwrap();
        model.observe(Arc::clone(&second), 1.0, 0.5, 0.9).unwrap();

        let expected = 0.5 + 0.1 * (1.0 - 0.3);
        assert!((model.issue_weight("price").unwrap() - expected).abs() < TOLERANCE);
        assert!((model.issue_weight("quantity").unwrap() - expected).abs() < TOLERANCE);

        // One transition: Q = 0.5 * 0 + 0.5 * (1 + 0.9 * 0)
        assert_eq!(model.q_value(&first), 0.5);
        assert_eq!(model.q_table().total_updates(), 1);
    }

    #[test]
    fn test_first_offer_only_seeds() {
        let mut model = model_at(0.0);
        model.observe(bid(10, 1), 1.0, 0.5, 0.9).unwrap();

        assert_eq!(model.offers().len(), 1);
        assert!(model.q_table().is_empty());
        assert_eq!(model.update_issue_weights(), 0);
        assert!((model.issue_weight("price").unwrap() - 0.5).abs() < TOLERANCE);
        assert!(model.value_weight("price", &10.into()).unwrap() > 1.0);
    }

    #[test]
    fn test_weight_increment_follows_progress() {
        let progress = ManualProgress::new(0.0);
        let mut model =
            OpponentModel::new(trade_domain(), progress.clone(), ModelConfig::default()).unwrap();

        model.observe(bid(10, 1), 0.0, 0.1, 0.9).unwrap();
        model.observe(bid(10, 3), 0.0, 0.1, 0.9).unwrap();
        assert!((model.issue_weight("price").unwrap() - 0.6).abs() < TOLERANCE);

        progress.set(0.5);
        model.observe(bid(10, 2), 0.0, 0.1, 0.9).unwrap();
        // 0.6 + 0.1 * (1 - 1.5)
        assert!((model.issue_weight("price").unwrap() - 0.55).abs() < TOLERANCE);
        assert!((model.issue_weight("quantity").unwrap() - 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_q_update_uses_primary_issue_as_action() {
        let mut model = model_at(0.0);
        let prev = bid(10, 1);
        let curr = bid(30, 3);

        let q = model.q_learning_update(&prev, &curr, 2.0, 1.0, 0.9);
        assert_eq!(q, 2.0);
        assert_eq!(model.action_of(&prev), ActionKey(Some(10.into())));
        assert_eq!(
            model.q_table().get(&model.state_of(&prev), &ActionKey(Some(10.into()))),
            2.0
        );

        // Going back to `prev`'s state bootstraps from the row written above.
        let q2 = model.q_learning_update(&curr, &prev, 1.0, 1.0, 0.9);
        assert_eq!(q2, 1.0 + 0.9 * 2.0);
    }

    #[test]
    fn test_non_finite_reward_leaves_q_table_untouched() {
        let mut model = model_at(0.0);
        let prev = bid(10, 1);
        model.q_learning_update(&prev, &bid(20, 2), 1.0, 1.0, 0.0);

        assert_eq!(model.q_learning_update(&prev, &bid(20, 2), f64::NAN, 0.5, 0.9), 1.0);
        assert_eq!(model.q_learning_update(&prev, &bid(20, 2), 1.0, f64::INFINITY, 0.9), 1.0);

        model.observe(Arc::clone(&prev), 0.0, 0.5, 0.9).unwrap();
        model.observe(bid(30, 3), f64::NEG_INFINITY, 0.5, 0.9).unwrap();
        assert_eq!(model.offers().len(), 2);
        assert_eq!(model.q_value(&prev), 1.0);
        assert_eq!(model.q_table().total_updates(), 1);
        assert!(model.q_table().entries().iter().all(|e| e.value.is_finite()));
    }

    #[test]
    fn test_auto_normalize_keeps_invariants() {
        let config = ModelConfig::default().with_auto_normalize(true);
        let mut model = OpponentModel::new(trade_domain(), FixedProgress(0.2), config).unwrap();

        for b in [bid(20, 2), bid(20, 2), bid(20, 1), bid(30, 1)] {
            model.observe(b, 0.0, 0.1, 0.9).unwrap();
        }

        let total: f64 = model.estimator().iter().map(|(_, i)| i.weight).sum();
        assert!((total - 1.0).abs() < TOLERANCE);
        for (_, issue) in model.estimator().iter() {
            assert_eq!(issue.max_value_weight(), 1.0);
        }
    }

    #[test]
    fn test_all_issues_projection() {
        let config = ModelConfig::default().with_projection(StateProjectionKind::AllIssues);
        let domain = trade_domain().with_issue("delivery", ["slow", "fast"]);
        let model = OpponentModel::new(domain, FixedProgress(0.0), config).unwrap();

        let b = Bid::new()
            .with("price", 10)
            .with("quantity", 2)
            .with("delivery", "fast");
        assert_eq!(model.state_of(&b).0.len(), 3);
    }

    #[test]
    fn test_restore_q_table() {
        let mut source = model_at(0.0);
        source.q_learning_update(&bid(10, 1), &bid(20, 2), 1.0, 1.0, 0.0);

        let mut target = model_at(0.0);
        target.restore_q_table(source.q_table().entries());
        assert_eq!(target.q_value(&bid(10, 1)), 1.0);
    }

    #[test]
    fn test_get_utility_surfaces_unknown_values() {
        let model = model_at(0.0);
        assert_eq!(model.get_utility(None).unwrap(), 0.0);
        assert!(matches!(
            model.get_utility(Some(&bid(11, 1))),
            Err(Error::MissingValue { .. })
        ));
        assert!(model.utility_lenient(Some(&bid(11, 1))) > 0.0);
    }
}
