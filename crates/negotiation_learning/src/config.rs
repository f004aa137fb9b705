//! Configuration for the opponent model and the negotiation session.

use crate::error::{Error, Result};
use crate::learning::StateProjectionKind;
use crate::persistence::PersistenceOptions;
use serde::{Deserialize, Serialize};

/// Defines the configuration for an `OpponentModel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Learning rate for issue-weight increments (alpha in `alpha * (1 - 3t)`).
    pub alpha: f64,
    /// Q-learning rate used by the session for every counterpart offer (0.0 to 1.0).
    pub learning_rate: f64,
    /// Q-learning discount factor used by the session (0.0 to 1.0).
    pub discount_factor: f64,
    /// How bids are projected onto Q-learning states.
    pub state_projection: StateProjectionKind,
    /// Renormalize issue and value weights after every update instead of only at
    /// construction.
    pub auto_normalize: bool,
    /// Carry the Q-table across sessions inside the learned-data snapshot.
    pub persist_q_table: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            learning_rate: 0.1,
            discount_factor: 0.9,
            state_projection: StateProjectionKind::default(),
            auto_normalize: false,
            persist_q_table: false,
        }
    }
}

impl ModelConfig {
    /// Returns a configuration that reacts quickly to a counterpart's changes, for
    /// short sessions with few offers.
    pub fn fast_adapting() -> Self {
        Self {
            alpha: 0.2,
            learning_rate: 0.3,
            discount_factor: 0.8,
            auto_normalize: true,
            ..Default::default()
        }
    }

    /// Returns a configuration that keeps Q-values across encounters with the same
    /// counterpart and projects over every issue.
    pub fn warm_start() -> Self {
        Self {
            state_projection: StateProjectionKind::AllIssues,
            persist_q_table: true,
            ..Default::default()
        }
    }

    /// Parses a configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every rate lies in its admissible range.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(Error::Config(format!("alpha must be in (0, 1], got {}", self.alpha)));
        }
        if !(0.0..=1.0).contains(&self.learning_rate) {
            return Err(Error::Config(format!(
                "learning_rate must be in [0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(Error::Config(format!(
                "discount_factor must be in [0, 1], got {}",
                self.discount_factor
            )));
        }
        if let StateProjectionKind::Features(issues) = &self.state_projection {
            if issues.is_empty() {
                return Err(Error::Config("state projection has no features".to_string()));
            }
        }
        Ok(())
    }

    /// Sets the issue-weight learning rate.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the Q-learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the Q-learning discount factor.
    pub fn with_discount_factor(mut self, discount_factor: f64) -> Self {
        self.discount_factor = discount_factor;
        self
    }

    /// Sets the state projection.
    pub fn with_projection(mut self, projection: StateProjectionKind) -> Self {
        self.state_projection = projection;
        self
    }

    /// Enables or disables renormalization after every update.
    pub fn with_auto_normalize(mut self, enabled: bool) -> Self {
        self.auto_normalize = enabled;
        self
    }

    /// Enables or disables cross-session Q-table persistence.
    pub fn with_q_table_persistence(mut self, enabled: bool) -> Self {
        self.persist_q_table = enabled;
        self
    }
}

/// Configuration for a `NegotiationSession`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Opponent model settings.
    pub model: ModelConfig,
    /// Snapshot encoding.
    pub persistence: PersistenceOptions,
}

impl SessionConfig {
    pub fn new(model: ModelConfig) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    /// Sets the snapshot encoding.
    pub fn with_persistence(mut self, persistence: PersistenceOptions) -> Self {
        self.persistence = persistence;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceFormat;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.alpha, 0.1);
        assert_eq!(config.discount_factor, 0.9);
        assert!(!config.persist_q_table);
        assert!(!config.auto_normalize);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(ModelConfig::fast_adapting().validate().is_ok());
        let warm = ModelConfig::warm_start();
        assert!(warm.persist_q_table);
        assert_eq!(warm.state_projection, StateProjectionKind::AllIssues);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(ModelConfig::default().with_alpha(0.0).validate().is_err());
        assert!(ModelConfig::default().with_alpha(f64::NAN).validate().is_err());
        assert!(ModelConfig::default().with_learning_rate(1.5).validate().is_err());
        assert!(ModelConfig::default().with_discount_factor(-0.1).validate().is_err());
        assert!(ModelConfig::default()
            .with_projection(StateProjectionKind::Features(vec![]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ModelConfig::default()
            .with_alpha(0.05)
            .with_projection(StateProjectionKind::AllIssues);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ModelConfig::from_json(&json).unwrap(), config);

        let bad = serde_json::to_string(&config.clone().with_alpha(3.0)).unwrap();
        assert!(matches!(ModelConfig::from_json(&bad), Err(Error::Config(_))));
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::new(ModelConfig::warm_start())
            .with_persistence(PersistenceOptions::readable());
        assert!(config.model.persist_q_table);
        assert_eq!(config.persistence.format, PersistenceFormat::Json);
    }
}
