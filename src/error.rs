// ⚠️ Error taxonomy
// Validation / not-found / persistence / external service

use crate::schema::ValidationError;
use thiserror::Error;

/// Errors surfaced by `AppState` operations and collaborators.
///
/// The engines themselves (rules, deduplication, statistics) never return
/// these: they answer with sentinel values so callers degrade gracefully.
#[derive(Error, Debug)]
pub enum FinanceError {
    #[error("Invalid transaction: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("\"{0}\" not found")]
    NotFound(String),

    #[error("\"{0}\" already exists")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Assistant service error: {0}")]
    Service(String),
}

impl From<rusqlite::Error> for FinanceError {
    fn from(err: rusqlite::Error) -> Self {
        FinanceError::Storage(err.to_string())
    }
}

impl FinanceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, FinanceError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FinanceError::NotFound(_))
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type FinanceResult<T> = Result<T, FinanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_field() {
        let err = FinanceError::Validation(vec![
            ValidationError::new("name", "Required field is empty"),
            ValidationError::new("amount", "Must be between 0.01 and 999999.99"),
        ]);

        let message = err.to_string();
        assert!(message.contains("name: Required field is empty"));
        assert!(message.contains("amount: Must be between"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_not_found_message() {
        let err = FinanceError::NotFound("tx-1".to_string());
        assert_eq!(err.to_string(), "\"tx-1\" not found");
        assert!(err.is_not_found());
    }
}
