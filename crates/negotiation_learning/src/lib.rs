#![doc = include_str!("../README.md")]
//! # Negotiation Learning
//!
//! Opponent modeling and online learning for a bilateral negotiation agent.
//!
//! ## Overview
//!
//! During a negotiation the agent receives a stream of offers from its counterpart.
//! This crate turns that stream into:
//! - **Issue weights**: which issues the counterpart cares about, inferred from the
//!   issues it keeps unchanged between consecutive offers
//! - **Value preferences**: how often each value was offered, per issue
//! - **Utility estimates**: a linear additive estimate of the counterpart's utility
//!   for any bid
//! - **Q-values**: a tabular value function over the counterpart's offer transitions
//! - **Learned data**: opponent-keyed facts that survive into the next session with
//!   the same counterpart
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     NegotiationSession                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  receive_bid ──► ┌──────────────────────────────────────┐    │
//! │                  │            OpponentModel             │    │
//! │                  │                                      │    │
//! │                  │  OfferLog ─► IssueWeightEstimator    │    │
//! │                  │     │            (weights, utility)  │    │
//! │                  │     └──────► QTable (StateProjection)│    │
//! │                  └──────────────────────────────────────┘    │
//! │                                                              │
//! │  load / save ◄─► LearnedDataStore ◄─► <dir>/<id>_data.blob   │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sessions
//!
//! A session runs `Init → Active → Terminal → Persisted`; see [`session`].

pub mod config;
pub mod domain;
pub mod error;
pub mod estimator;
pub mod learned_data;
pub mod learning;
pub mod offer_log;
pub mod opponent_model;
pub mod persistence;
pub mod session;
pub mod types;

pub use config::{ModelConfig, SessionConfig};
pub use domain::{Bid, Domain, FixedProgress, IssueSpec, ManualProgress, Progress, TimedProgress};
pub use error::{Error, Result};
pub use estimator::{IssueEstimate, IssueWeightEstimator, VALUE_WEIGHT_EPSILON};
pub use learned_data::{keys, LearnedData, LearnedValue, Snapshot, SNAPSHOT_VERSION};
pub use learning::{
    ActionKey, FeatureSubset, FullIssueVector, QEntry, QTable, StateActionPair, StateKey,
    StateProjection, StateProjectionKind,
};
pub use offer_log::OfferLog;
pub use opponent_model::OpponentModel;
pub use persistence::{
    snapshot_path, LearnedDataStore, PersistenceError, PersistenceFormat, PersistenceOptions,
};
pub use session::{AgreementRecord, NegotiationSession, SessionPhase};
pub use types::*;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Creates an opponent model with the default configuration.
///
/// # Examples
///
/// ```
/// use negotiation_learning::{create_model, Bid, Domain, FixedProgress};
///
/// let domain = Domain::new("trade")
///     .with_issue("price", [10, 20, 30])
///     .with_issue("quantity", [1, 2, 3]);
/// let model = create_model(domain, FixedProgress(0.0)).unwrap();
///
/// assert_eq!(model.get_utility(None).unwrap(), 0.0);
/// assert_eq!(model.issue_weight("price"), Some(0.5));
/// ```
pub fn create_model(domain: Domain, progress: impl Progress + 'static) -> Result<OpponentModel> {
    OpponentModel::new(domain, progress, ModelConfig::default())
}

/// Creates a negotiation session with the default configuration.
///
/// # See Also
///
/// - [`NegotiationSession::new`] for custom configuration
/// - [`ModelConfig::warm_start`] to carry Q-values between sessions
pub fn create_session(
    domain: Domain,
    progress: impl Progress + 'static,
) -> Result<NegotiationSession> {
    NegotiationSession::new(domain, progress, SessionConfig::default())
}
