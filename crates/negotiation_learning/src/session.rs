//! One negotiation against one counterpart, from loading prior knowledge to
//! persisting what was learned.
//!
//! A [`NegotiationSession`] owns the [`OpponentModel`], the agent's own offer log and
//! the counterpart's [`LearnedDataStore`]. It moves through a fixed sequence of
//! phases:
//!
//! ```text
//! Init ──load/receive──► Active ──agreement/end──► Terminal ──save──► Persisted
//! ```
//!
//! There are no cycles; an operation attempted in the wrong phase fails with
//! [`Error::InvalidTransition`].

use crate::config::SessionConfig;
use crate::domain::{Bid, Domain, Progress};
use crate::error::{Error, Result};
use crate::learned_data::{keys, LearnedData};
use crate::offer_log::OfferLog;
use crate::opponent_model::OpponentModel;
use crate::persistence::LearnedDataStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Lifecycle phase of a [`NegotiationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionPhase {
    /// Created; prior knowledge may still be loaded.
    #[default]
    Init,
    /// At least one offer has been exchanged.
    Active,
    /// The negotiation has ended, with or without agreement.
    Terminal,
    /// Learned data has been handed to storage.
    Persisted,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Init => "init",
            SessionPhase::Active => "active",
            SessionPhase::Terminal => "terminal",
            SessionPhase::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// What was recorded when an agreement was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementRecord {
    /// The bid both sides accepted.
    pub bid: Bid,
    /// `true` if the counterpart accepted the agent's offer.
    pub opponent_accepted: bool,
    /// Elapsed-time fraction at the moment of agreement.
    pub acceptance_time: f64,
    /// Estimated counterpart utility of `bid`.
    pub accepted_utility: f64,
    /// Agreements with this counterpart so far, this one included.
    pub agreement_count: i64,
}

/// A single negotiation session against one counterpart.
#[derive(Debug)]
pub struct NegotiationSession {
    model: OpponentModel,
    own_offers: OfferLog,
    store: LearnedDataStore,
    phase: SessionPhase,
    opponent_id: Option<String>,
    config: SessionConfig,
}

impl NegotiationSession {
    /// Creates a session in the [`SessionPhase::Init`] phase.
    pub fn new(
        domain: Domain,
        progress: impl Progress + 'static,
        config: SessionConfig,
    ) -> Result<Self> {
        let model = OpponentModel::new(domain, progress, config.model.clone())?;
        let store = LearnedDataStore::new(config.persistence.clone());

        Ok(Self {
            model,
            own_offers: OfferLog::new(),
            store,
            phase: SessionPhase::Init,
            opponent_id: None,
            config,
        })
    }

    /// Loads what was learned about `opponent_id` in earlier sessions.
    ///
    /// Missing keys or a missing snapshot yield empty data; an unreadable snapshot is
    /// logged and also yields empty data. With Q-table persistence enabled, stored
    /// Q-values seed the model.
    pub fn load(
        &mut self,
        storage_dir: Option<&Path>,
        opponent_id: Option<&str>,
    ) -> Result<&LearnedData> {
        self.ensure_phase(&[SessionPhase::Init], "load learned data")?;

        self.opponent_id = opponent_id.map(str::to_string);
        self.store.load_data(storage_dir, opponent_id);

        if self.config.model.persist_q_table && !self.store.q_values().is_empty() {
            self.model.restore_q_table(self.store.q_values().to_vec());
            log::debug!(
                "Restored {} Q-values for {:?}",
                self.model.q_table().len(),
                self.opponent_id
            );
        }

        Ok(self.store.data())
    }

    /// Feeds a counterpart offer and its reward into the opponent model.
    pub fn receive_bid(&mut self, bid: impl Into<Arc<Bid>>, reward: f64) -> Result<()> {
        self.ensure_phase(&[SessionPhase::Init, SessionPhase::Active], "receive a bid")?;
        self.phase = SessionPhase::Active;

        let lr = self.config.model.learning_rate;
        let df = self.config.model.discount_factor;
        self.model.observe(bid.into(), reward, lr, df)
    }

    /// Records an offer the agent itself made.
    pub fn record_own_bid(&mut self, bid: impl Into<Arc<Bid>>) -> Result<()> {
        self.ensure_phase(&[SessionPhase::Init, SessionPhase::Active], "record an own bid")?;
        self.phase = SessionPhase::Active;
        self.own_offers.append(bid.into());
        Ok(())
    }

    /// Estimated counterpart utility of `bid`, for the bidding strategy.
    ///
    /// Values the domain never declared are scored at the raw epsilon weight instead
    /// of failing.
    pub fn get_utility(&self, bid: Option<&Bid>) -> f64 {
        self.model.utility_lenient(bid)
    }

    /// Ends the session with an agreement on `accepted_bid`.
    pub fn reach_agreement(
        &mut self,
        accepted_bid: &Bid,
        opponent_accepted: bool,
    ) -> Result<AgreementRecord> {
        self.ensure_phase(&[SessionPhase::Init, SessionPhase::Active], "reach an agreement")?;

        let acceptance_time = self.model.elapsed();
        let accepted_utility = self.get_utility(Some(accepted_bid));

        let data = self.store.data_mut();
        data.insert(keys::AGREEMENT_REACHED, true);
        data.insert(keys::OPPONENT_ACCEPTED, opponent_accepted);
        data.insert(keys::ACCEPTANCE_TIME, acceptance_time);
        data.insert(keys::ACCEPTED_UTILITY, accepted_utility);
        let agreement_count = data.increment(keys::AGREEMENT_COUNT);

        self.finish();

        log::info!(
            "Agreement with {:?} at t = {:.3} (estimated opponent utility {:.3})",
            self.opponent_id,
            acceptance_time,
            accepted_utility
        );

        Ok(AgreementRecord {
            bid: accepted_bid.clone(),
            opponent_accepted,
            acceptance_time,
            accepted_utility,
            agreement_count,
        })
    }

    /// Ends the session without an agreement.
    pub fn end_without_agreement(&mut self) -> Result<()> {
        self.ensure_phase(&[SessionPhase::Init, SessionPhase::Active], "end the session")?;

        let data = self.store.data_mut();
        data.insert(keys::AGREEMENT_REACHED, false);
        data.remove(keys::OPPONENT_ACCEPTED);
        data.remove(keys::ACCEPTANCE_TIME);
        data.remove(keys::ACCEPTED_UTILITY);

        self.finish();

        log::info!("Session with {:?} ended without agreement", self.opponent_id);
        Ok(())
    }

    /// Writes the learned data for the counterpart.
    ///
    /// `opponent_id` falls back to the identity given to [`load`](Self::load).
    /// Returns `Ok(false)` when no storage directory or identity is known; the
    /// session is persisted either way.
    pub fn save(&mut self, storage_dir: Option<&Path>, opponent_id: Option<&str>) -> Result<bool> {
        self.ensure_phase(&[SessionPhase::Terminal], "save learned data")?;

        if self.config.model.persist_q_table {
            self.store.set_q_values(self.model.q_table().entries());
        }

        let opponent_id = opponent_id.or(self.opponent_id.as_deref());
        let saved = self.store.save_data(storage_dir, opponent_id)?;

        self.phase = SessionPhase::Persisted;
        Ok(saved)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Counterpart identity recorded by [`load`](Self::load).
    pub fn opponent_id(&self) -> Option<&str> {
        self.opponent_id.as_deref()
    }

    pub fn learned_data(&self) -> &LearnedData {
        self.store.data()
    }

    pub fn learned_data_mut(&mut self) -> &mut LearnedData {
        self.store.data_mut()
    }

    pub fn model(&self) -> &OpponentModel {
        &self.model
    }

    /// Offers the agent made, in order.
    pub fn own_offers(&self) -> &OfferLog {
        &self.own_offers
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn finish(&mut self) {
        let received = self.model.offers().len() as i64;
        let data = self.store.data_mut();
        data.increment(keys::SESSION_COUNT);
        data.insert(keys::RECEIVED_BID_COUNT, received);
        self.phase = SessionPhase::Terminal;
    }

    fn ensure_phase(&self, allowed: &[SessionPhase], action: &str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                from: self.phase.to_string(),
                action: action.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::domain::FixedProgress;
    use crate::learned_data::LearnedValue;
    use crate::persistence::snapshot_path;
    use tempfile::TempDir;

    fn trade_domain() -> Domain {
        Domain::new("trade")
            .with_issue("price", [10, 20, 30])
            .with_issue("quantity", [1, 2, 3])
    }

    fn bid(price: i64, quantity: i64) -> Bid {
        Bid::new().with("price", price).with("quantity", quantity)
    }

    fn session(config: SessionConfig) -> NegotiationSession {
        NegotiationSession::new(trade_domain(), FixedProgress(0.25), config).unwrap()
    }

    #[test]
    fn test_agreement_records_learned_data() {
        let mut s = session(SessionConfig::default());
        s.load(None, None).unwrap();
        s.receive_bid(bid(30, 1), 0.0).unwrap();
        s.record_own_bid(bid(10, 3)).unwrap();
        s.receive_bid(bid(20, 1), 0.5).unwrap();
        assert_eq!(s.phase(), SessionPhase::Active);

        let record = s.reach_agreement(&bid(20, 2), true).unwrap();
        assert_eq!(s.phase(), SessionPhase::Terminal);
        assert_eq!(record.acceptance_time, 0.25);
        assert_eq!(record.agreement_count, 1);
        assert!(record.accepted_utility > 0.0);

        let data = s.learned_data();
        assert_eq!(data.get(keys::AGREEMENT_REACHED), Some(&LearnedValue::Bool(true)));
        assert_eq!(data.get(keys::OPPONENT_ACCEPTED), Some(&LearnedValue::Bool(true)));
        assert_eq!(data.get(keys::ACCEPTANCE_TIME), Some(&LearnedValue::Float(0.25)));
        assert_eq!(data.get(keys::SESSION_COUNT), Some(&LearnedValue::Int(1)));
        assert_eq!(data.get(keys::RECEIVED_BID_COUNT), Some(&LearnedValue::Int(2)));
        assert_eq!(s.own_offers().len(), 1);
    }

    #[test]
    fn test_end_without_agreement_clears_acceptance() {
        let mut s = session(SessionConfig::default());
        s.learned_data_mut().insert(keys::ACCEPTANCE_TIME, 0.9);
        s.receive_bid(bid(10, 1), 0.0).unwrap();
        s.end_without_agreement().unwrap();

        let data = s.learned_data();
        assert_eq!(data.get(keys::AGREEMENT_REACHED), Some(&LearnedValue::Bool(false)));
        assert!(!data.contains_key(keys::ACCEPTANCE_TIME));
        assert_eq!(data.get(keys::SESSION_COUNT), Some(&LearnedValue::Int(1)));
    }

    #[test]
    fn test_phase_transitions_are_enforced() {
        let mut s = session(SessionConfig::default());
        assert!(matches!(
            s.save(None, None),
            Err(Error::InvalidTransition { .. })
        ));

        s.receive_bid(bid(10, 1), 0.0).unwrap();
        assert!(matches!(
            s.load(None, Some("late")),
            Err(Error::InvalidTransition { .. })
        ));

        s.end_without_agreement().unwrap();
        assert!(s.receive_bid(bid(10, 1), 0.0).is_err());
        assert!(s.reach_agreement(&bid(10, 1), false).is_err());
        assert!(s.end_without_agreement().is_err());

        assert!(!s.save(None, None).unwrap());
        assert_eq!(s.phase(), SessionPhase::Persisted);
        assert!(s.save(None, None).is_err());
    }

    #[test]
    fn test_invalid_transition_message() {
        let mut s = session(SessionConfig::default());
        let err = s.save(None, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot save learned data while init"
        );
    }

    #[test]
    fn test_save_and_reload_across_sessions() {
        let dir = TempDir::new().unwrap();

        let mut first = session(SessionConfig::default());
        first.load(Some(dir.path()), Some("hardliner")).unwrap();
        first.receive_bid(bid(30, 1), 0.0).unwrap();
        first.reach_agreement(&bid(30, 1), false).unwrap();
        assert!(first.save(Some(dir.path()), None).unwrap());

        let mut second = session(SessionConfig::default());
        let loaded = second.load(Some(dir.path()), Some("hardliner")).unwrap();
        assert_eq!(loaded, first.learned_data());

        second.receive_bid(bid(20, 2), 0.0).unwrap();
        let record = second.reach_agreement(&bid(20, 2), true).unwrap();
        assert_eq!(record.agreement_count, 2);
        assert_eq!(
            second.learned_data().get(keys::SESSION_COUNT),
            Some(&LearnedValue::Int(2))
        );
    }

    #[test]
    fn test_q_table_persists_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let play = |config: SessionConfig| {
            let mut s = session(config);
            s.load(Some(dir.path()), Some("bot")).unwrap();
            s.receive_bid(bid(10, 1), 0.0).unwrap();
            s.receive_bid(bid(20, 2), 1.0).unwrap();
            s.end_without_agreement().unwrap();
            s.save(Some(dir.path()), Some("bot")).unwrap();
        };

        play(SessionConfig::default());
        let mut cold = session(SessionConfig::default());
        cold.load(Some(dir.path()), Some("bot")).unwrap();
        assert!(cold.model().q_table().is_empty());

        let warm_config = SessionConfig::new(ModelConfig::default().with_q_table_persistence(true));
        play(warm_config.clone());
        let mut warm = session(warm_config);
        warm.load(Some(dir.path()), Some("bot")).unwrap();
        assert_eq!(warm.model().q_table().len(), 1);
        assert!(warm.model().q_value(&bid(10, 1)) > 0.0);
    }

    #[test]
    fn test_non_finite_reward_does_not_poison_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig::new(ModelConfig::warm_start());

        let mut first = session(config.clone());
        first.load(Some(dir.path()), Some("bot")).unwrap();
        first.receive_bid(bid(10, 1), 0.0).unwrap();
        first.receive_bid(bid(20, 2), f64::NAN).unwrap();
        first.receive_bid(bid(30, 3), 1.0).unwrap();
        first.end_without_agreement().unwrap();
        assert!(first.save(Some(dir.path()), None).unwrap());

        let mut second = session(config);
        let loaded = second.load(Some(dir.path()), Some("bot")).unwrap();
        assert_eq!(loaded.get(keys::SESSION_COUNT), Some(&LearnedValue::Int(1)));
        assert_eq!(second.model().q_table().len(), 1);
    }

    #[test]
    fn test_saturated_counter_does_not_abort_session() {
        let dir = TempDir::new().unwrap();
        let mut seeded = LearnedData::new();
        seeded.insert(keys::SESSION_COUNT, i64::MAX);
        seeded.insert(keys::AGREEMENT_COUNT, i64::MAX);
        let mut store = LearnedDataStore::default();
        *store.data_mut() = seeded;
        store.save_data(Some(dir.path()), Some("tampered")).unwrap();

        let mut s = session(SessionConfig::default());
        s.load(Some(dir.path()), Some("tampered")).unwrap();
        let record = s.reach_agreement(&bid(10, 1), true).unwrap();
        assert_eq!(record.agreement_count, i64::MAX);
        assert_eq!(
            s.learned_data().get(keys::SESSION_COUNT),
            Some(&LearnedValue::Int(i64::MAX))
        );
    }

    #[test]
    fn test_corrupt_snapshot_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(dir.path(), "garbled").unwrap();
        std::fs::write(&path, b"definitely not a snapshot").unwrap();

        let mut s = session(SessionConfig::default());
        assert!(s.load(Some(dir.path()), Some("garbled")).unwrap().is_empty());
        assert_eq!(s.opponent_id(), Some("garbled"));
    }

    #[test]
    fn test_unknown_value_scores_leniently() {
        let s = session(SessionConfig::default());
        let odd = bid(999, 1);
        assert!(s.get_utility(Some(&odd)) > 0.0);
        assert_eq!(s.get_utility(None), 0.0);
    }
}
