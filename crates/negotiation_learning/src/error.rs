//! Error types for the negotiation learning core.

use crate::persistence::PersistenceError;

/// A specialized `Result` type for model and session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error enum for all operations within the `negotiation_learning` crate.
#[derive(Debug)]
pub enum Error {
    /// The model configuration or the negotiation domain is invalid.
    Config(String),
    /// A bid carried a value the issue's value-weight table has never heard of.
    MissingValue {
        /// The issue being scored.
        issue: String,
        /// The unknown value, rendered for display.
        value: String,
    },
    /// A numeric invariant of the estimator would be broken (e.g. a zero denominator
    /// while normalizing).
    InvariantViolation(String),
    /// The session was asked to do something its current phase does not allow.
    InvalidTransition {
        /// The phase the session was in.
        from: String,
        /// The operation that was attempted.
        action: String,
    },
    /// Reading or writing a learned-data snapshot failed.
    Persistence(PersistenceError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(s) => write!(f, "Configuration error: {}", s),
            Error::MissingValue { issue, value } => {
                write!(f, "Missing value: '{}' is not a known value of issue '{}'", value, issue)
            }
            Error::InvariantViolation(s) => write!(f, "Invariant violation: {}", s),
            Error::InvalidTransition { from, action } => {
                write!(f, "Invalid transition: cannot {} while {}", action, from)
            }
            Error::Persistence(e) => write!(f, "Persistence error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Error::Persistence(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Returns `true` for data-integrity failures that a session should absorb
    /// (log and continue) rather than abort on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MissingValue { .. } | Error::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                Error::Config("alpha out of range".into()),
                "Configuration error: alpha out of range",
            ),
            (
                Error::MissingValue {
                    issue: "price".into(),
                    value: "99".into(),
                },
                "Missing value: '99' is not a known value of issue 'price'",
            ),
            (
                Error::InvariantViolation("zero total".into()),
                "Invariant violation: zero total",
            ),
            (
                Error::InvalidTransition {
                    from: "Persisted".into(),
                    action: "receive a bid".into(),
                },
                "Invalid transition: cannot receive a bid while Persisted",
            ),
        ];

        for (error, expected) in errors {
            assert_eq!(format!("{}", error), expected);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{invalid}");
        let error: Error = json_result.unwrap_err().into();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_persistence_error_is_source() {
        let error: Error = PersistenceError::InvalidIdentity("..".into()).into();
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(!Error::Config("x".into()).is_recoverable());
        assert!(!Error::InvariantViolation("x".into()).is_recoverable());
        assert!(Error::MissingValue {
            issue: "i".into(),
            value: "v".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_error() -> Result<()> {
            Err(Error::Config("test".into()))
        }
        assert!(returns_error().is_err());
    }
}
