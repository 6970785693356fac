// 💾 Transaction Store - record types
// Transactions are kept in an ordered Vec owned by AppState and persisted
// wholesale through the key-value store (see storage.rs).

use crate::temporal::normalize_date;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Normal,
    Refunded,
}

/// Where a transaction came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    #[default]
    Manual,
    Imported,
    Ocr,
    AiChat,
    #[serde(other)]
    Unknown,
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A single recorded expense.
///
/// Serialized with camelCase keys so snapshots stay readable next to the
/// browser app's own exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Stable identity, assigned at creation and never reused
    pub id: String,

    /// Payee / establishment label
    pub name: String,

    /// Positive amount in the user's currency
    pub amount: f64,

    /// "YYYY-MM-DD" or "YYYY-MM-DDTHH:MM[:SS]"; other accepted layouts are
    /// rewritten on the way in
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default)]
    pub status: TransactionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_installment: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_installments: Option<u32>,

    // ========================================================================
    // DUPLICATE DETECTION (set by the engine, not user-editable)
    // ========================================================================
    /// Flagged on insert by automatic detection
    #[serde(default)]
    pub is_possible_duplicate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_confidence: Option<u8>,

    /// Manually confirmed duplicate annotation (never deletes anything)
    #[serde(default)]
    pub is_duplicate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_marked_at: Option<DateTime<Utc>>,

    // ========================================================================
    // BOOKKEEPING
    // ========================================================================
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub source: Source,
}

impl Transaction {
    /// Build a stored record from validated input
    pub fn from_input(input: TransactionInput, now: DateTime<Utc>) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            amount: input.amount,
            date: normalize_date(&input.date),
            method: non_empty(input.method),
            category: non_empty(input.category),
            subcategory: non_empty(input.subcategory),
            notes: non_empty(input.notes),
            status: input.status,
            current_installment: input.current_installment,
            total_installments: input.total_installments,
            is_possible_duplicate: false,
            duplicate_of: None,
            duplicate_confidence: None,
            is_duplicate: false,
            duplicate_marked_at: None,
            created_at: now,
            updated_at: now,
            source: input.source,
        }
    }

    /// Lower-cased, trimmed label used for every name comparison
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn is_refunded(&self) -> bool {
        self.status == TransactionStatus::Refunded
    }

    /// "3/12" when part of an installment plan
    pub fn installment_label(&self) -> Option<String> {
        match (self.current_installment, self.total_installments) {
            (Some(current), Some(total)) => Some(format!("{}/{}", current, total)),
            _ => None,
        }
    }

    /// Clear the automatic duplicate flag. A manual annotation keeps its
    /// `duplicate_of` link.
    pub fn clear_possible_duplicate(&mut self) {
        self.is_possible_duplicate = false;
        self.duplicate_confidence = None;
        if !self.is_duplicate {
            self.duplicate_of = None;
        }
    }
}

/// Normalize a payee label: lower-case + trim
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// INPUT & PATCH
// ============================================================================

/// What a caller supplies to create a transaction (manual entry, import,
/// assistant). Every path goes through the same validation, categorization
/// and duplicate detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub name: String,
    pub amount: f64,
    pub date: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub current_installment: Option<u32>,
    #[serde(default)]
    pub total_installments: Option<u32>,
    #[serde(default)]
    pub source: Source,
}

impl TransactionInput {
    pub fn new(name: &str, amount: f64, date: &str) -> Self {
        TransactionInput {
            name: name.to_string(),
            amount,
            date: date.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: payment method
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    /// Builder pattern: explicit category / subcategory
    pub fn with_category(mut self, category: &str, subcategory: Option<&str>) -> Self {
        self.category = Some(category.to_string());
        self.subcategory = subcategory.map(str::to_string);
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn with_installments(mut self, current: u32, total: u32) -> Self {
        self.current_installment = Some(current);
        self.total_installments = Some(total);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub method: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub notes: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Outer None = untouched, Some(None) = clear the plan
    pub installments: Option<Option<(u32, u32)>>,
}

impl TransactionPatch {
    /// Apply onto a copy of `tx`; the caller validates and stores the result
    pub fn apply(&self, tx: &Transaction) -> Transaction {
        let mut next = tx.clone();

        if let Some(name) = &self.name {
            next.name = name.trim().to_string();
        }
        if let Some(amount) = self.amount {
            next.amount = amount;
        }
        if let Some(date) = &self.date {
            next.date = normalize_date(date);
        }
        if let Some(method) = &self.method {
            next.method = non_empty(Some(method.clone()));
        }
        if let Some(category) = &self.category {
            next.category = non_empty(Some(category.clone()));
        }
        if let Some(subcategory) = &self.subcategory {
            next.subcategory = non_empty(Some(subcategory.clone()));
        }
        if let Some(notes) = &self.notes {
            next.notes = non_empty(Some(notes.clone()));
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(installments) = self.installments {
            next.current_installment = installments.map(|(current, _)| current);
            next.total_installments = installments.map(|(_, total)| total);
        }

        next
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_trims_and_drops_empty_optionals() {
        let input = TransactionInput::new("  Padaria ABC ", 10.0, "2024-07-01")
            .with_method("   ")
            .with_notes("fresh bread");

        let tx = Transaction::from_input(input, Utc::now());

        assert_eq!(tx.name, "Padaria ABC");
        assert_eq!(tx.method, None);
        assert_eq!(tx.notes, Some("fresh bread".to_string()));
        assert_eq!(tx.status, TransactionStatus::Normal);
        assert!(!tx.id.is_empty());
        assert_eq!(tx.created_at, tx.updated_at);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Transaction::from_input(TransactionInput::new("A", 1.0, "2024-07-01"), Utc::now());
        let b = Transaction::from_input(TransactionInput::new("A", 1.0, "2024-07-01"), Utc::now());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalize_name("  Posto SHELL "), "posto shell");
    }

    #[test]
    fn test_installment_label() {
        let tx = Transaction::from_input(
            TransactionInput::new("Loja", 100.0, "2024-07-01").with_installments(3, 12),
            Utc::now(),
        );
        assert_eq!(tx.installment_label(), Some("3/12".to_string()));
    }

    #[test]
    fn test_patch_applies_only_given_fields() {
        let tx = Transaction::from_input(
            TransactionInput::new("Loja", 100.0, "2024-07-01")
                .with_method("PIX")
                .with_installments(1, 2),
            Utc::now(),
        );

        let patch = TransactionPatch {
            amount: Some(120.0),
            method: Some(String::new()),
            status: Some(TransactionStatus::Refunded),
            installments: Some(None),
            ..Default::default()
        };
        let next = patch.apply(&tx);

        assert_eq!(next.name, "Loja");
        assert_eq!(next.amount, 120.0);
        assert_eq!(next.method, None);
        assert!(next.is_refunded());
        assert_eq!(next.current_installment, None);
        assert_eq!(next.total_installments, None);
        assert_eq!(next.id, tx.id);
    }

    #[test]
    fn test_serde_uses_camel_case_and_defaults() {
        let json = serde_json::json!({
            "id": "abc",
            "name": "Posto Shell",
            "amount": 100.0,
            "date": "2024-07-13",
            "createdAt": "2024-07-13T10:00:00Z",
            "updatedAt": "2024-07-13T10:00:00Z",
            "source": "ocr_real"
        });

        let tx: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(tx.status, TransactionStatus::Normal);
        assert!(!tx.is_possible_duplicate);
        assert_eq!(tx.source, Source::Unknown);

        let back = serde_json::to_value(&tx).unwrap();
        assert!(back.get("isPossibleDuplicate").is_some());
        assert!(back.get("duplicateOf").is_none());
    }

    #[test]
    fn test_dates_are_stored_iso() {
        let tx = Transaction::from_input(TransactionInput::new("Loja", 10.0, "15/07/2024"), Utc::now());
        assert_eq!(tx.date, "2024-07-15");

        let patch = TransactionPatch {
            date: Some("01/08/2024".to_string()),
            ..Default::default()
        };
        assert_eq!(patch.apply(&tx).date, "2024-08-01");
    }

    #[test]
    fn test_clear_possible_duplicate_keeps_manual_link() {
        let mut tx = Transaction::from_input(TransactionInput::new("Loja", 10.0, "2024-07-01"), Utc::now());
        tx.is_possible_duplicate = true;
        tx.duplicate_of = Some("a".to_string());
        tx.duplicate_confidence = Some(85);

        let mut marked = tx.clone();
        marked.is_duplicate = true;

        tx.clear_possible_duplicate();
        assert!(!tx.is_possible_duplicate);
        assert_eq!(tx.duplicate_of, None);
        assert_eq!(tx.duplicate_confidence, None);

        marked.clear_possible_duplicate();
        assert!(!marked.is_possible_duplicate);
        assert_eq!(marked.duplicate_of.as_deref(), Some("a"));
    }
}
