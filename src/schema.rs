// 📐 Shape Layer - Schema Validation
// Validates transaction input and the monthly goal before anything is stored.
// A failed validation never mutates state.

use crate::config::ValidationLimits;
use crate::db::{Transaction, TransactionInput};
use crate::goals::MonthlyGoal;
use crate::temporal::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Borrowed view of the fields every transaction shape shares
struct Fields<'a> {
    name: &'a str,
    amount: f64,
    date: &'a str,
    current_installment: Option<u32>,
    total_installments: Option<u32>,
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    limits: ValidationLimits,
}

impl SchemaValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        SchemaValidator { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate caller-supplied input (manual entry, import, assistant)
    pub fn validate_input(&self, input: &TransactionInput) -> ValidationResult {
        self.validate_fields(Fields {
            name: &input.name,
            amount: input.amount,
            date: &input.date,
            current_installment: input.current_installment,
            total_installments: input.total_installments,
        })
    }

    /// Validate a stored record (used after applying an edit)
    pub fn validate_transaction(&self, tx: &Transaction) -> ValidationResult {
        self.validate_fields(Fields {
            name: &tx.name,
            amount: tx.amount,
            date: &tx.date,
            current_installment: tx.current_installment,
            total_installments: tx.total_installments,
        })
    }

    fn validate_fields(&self, fields: Fields<'_>) -> ValidationResult {
        let mut errors = Vec::new();

        if fields.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "Required field is empty"));
        }

        if !fields.amount.is_finite()
            || fields.amount < self.limits.min_amount
            || fields.amount > self.limits.max_amount
        {
            errors.push(ValidationError::new(
                "amount",
                &format!(
                    "Must be between {:.2} and {:.2}, got {}",
                    self.limits.min_amount, self.limits.max_amount, fields.amount
                ),
            ));
        }

        if fields.date.trim().is_empty() {
            errors.push(ValidationError::new("date", "Required field is empty"));
        } else if parse_timestamp(fields.date).is_none() {
            errors.push(ValidationError::new(
                "date",
                &format!("Not a valid date: {}", fields.date),
            ));
        }

        match (fields.current_installment, fields.total_installments) {
            (None, None) => {}
            (Some(current), Some(total)) => {
                if current == 0 || total == 0 {
                    errors.push(ValidationError::new(
                        "installments",
                        "Installment numbers must be positive",
                    ));
                }
            }
            _ => {
                errors.push(ValidationError::new(
                    "installments",
                    "Current and total installments must be set together",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every id in a whole collection (snapshot, stored document) is unique
    pub fn validate_ids(&self, transactions: &[Transaction]) -> ValidationResult {
        let mut seen = HashSet::new();
        let errors: Vec<ValidationError> = transactions
            .iter()
            .filter(|tx| !seen.insert(tx.id.as_str()))
            .map(|tx| ValidationError::new("id", &format!("Duplicate id: {}", tx.id)))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a monthly goal before it replaces the current one
    pub fn validate_goal(&self, goal: &MonthlyGoal) -> ValidationResult {
        let mut errors = Vec::new();
        let limits = &self.limits;

        if !goal.goal.is_finite() || goal.goal < limits.min_goal || goal.goal > limits.max_goal {
            errors.push(ValidationError::new(
                "goal",
                &format!(
                    "Must be between {} and {}, got {}",
                    limits.min_goal, limits.max_goal, goal.goal
                ),
            ));
        }

        for (field, day) in [("dueDate", goal.due_date), ("bestBuyDate", goal.best_buy_date)] {
            if day < limits.min_day || day > limits.max_day {
                errors.push(ValidationError::new(
                    field,
                    &format!(
                        "Day must be between {} and {}, got {}",
                        limits.min_day, limits.max_day, day
                    ),
                ));
            }
        }

        if goal.alert_percentage < limits.min_percentage
            || goal.alert_percentage > limits.max_percentage
        {
            errors.push(ValidationError::new(
                "alertPercentage",
                &format!(
                    "Percentage must be between {} and {}, got {}",
                    limits.min_percentage, limits.max_percentage, goal.alert_percentage
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(ValidationLimits::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
