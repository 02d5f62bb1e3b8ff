use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{Result, StructuredError},
    validation::{summarize, Violation},
};

/// Validation outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Valid(Value),
    Invalid(Vec<Violation>),
}

/// Information about an individual round-trip to the backend.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    /// 1-based attempt index.
    pub index: usize,
    pub started_at: DateTime<Utc>,
    /// Raw backend text; `None` when the call itself failed.
    pub raw_output: Option<String>,
    pub outcome: AttemptOutcome,
}

impl GenerationAttempt {
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Valid(_))
    }

    pub fn violations(&self) -> &[Violation] {
        match &self.outcome {
            AttemptOutcome::Valid(_) => &[],
            AttemptOutcome::Invalid(violations) => violations,
        }
    }
}

/// Terminal outcome of a generation call.
#[derive(Debug, Clone)]
pub enum GenerationResult {
    /// A value conforming to the schema.
    Success { value: Value, attempts: usize },
    /// Attempts were exhausted; carries the last attempt for diagnostics.
    Failure {
        last_attempt: GenerationAttempt,
        attempts: usize,
    },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of backend invocations made.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// Violations of the final attempt; empty on success.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { last_attempt, .. } => last_attempt.violations(),
        }
    }

    /// Raw text of the final failed attempt, if the backend returned any.
    pub fn last_output(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { last_attempt, .. } => last_attempt.raw_output.as_deref(),
        }
    }

    /// Convert into the parsed value, turning exhaustion into an error.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure {
                last_attempt,
                attempts,
            } => Err(StructuredError::GenerationFailed {
                attempts,
                violations: summarize(last_attempt.violations()),
            }),
        }
    }

    /// Convert into a typed value.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_value()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure() -> GenerationResult {
        GenerationResult::Failure {
            last_attempt: GenerationAttempt {
                index: 3,
                started_at: Utc::now(),
                raw_output: Some("{}".to_string()),
                outcome: AttemptOutcome::Invalid(vec![Violation::MissingField {
                    path: "setup".to_string(),
                }]),
            },
            attempts: 3,
        }
    }

    #[test]
    fn failure_exposes_last_attempt() {
        let result = failure();
        assert!(!result.is_success());
        assert_eq!(result.attempts(), 3);
        assert_eq!(result.violations().len(), 1);
        assert_eq!(result.last_output(), Some("{}"));
        assert!(result.value().is_none());
    }

    #[test]
    fn into_value_reports_exhaustion() {
        let err = failure().into_value().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Generation failed after 3 attempts: field 'setup' missing"
        );
    }

    #[test]
    fn into_typed_deserializes_success() {
        #[derive(serde::Deserialize)]
        struct Joke {
            setup: String,
        }
        let result = GenerationResult::Success {
            value: json!({"setup": "Why?", "punchline": "Because."}),
            attempts: 1,
        };
        let joke: Joke = result.into_typed().unwrap();
        assert_eq!(joke.setup, "Why?");
    }
}
