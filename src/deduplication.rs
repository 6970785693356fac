// 🔍 Deduplication Engine - Detect duplicate transactions
// Two strategies: Strict (exact name, 5 minutes) and Fuzzy (similar name, 24 hours)
// Confidence is an additive 0-100 score, reported as the max over candidates.

use crate::config::DuplicateSettings;
use crate::db::Transaction;
use crate::fuzzy::{are_similar, DEFAULT_THRESHOLD};
use crate::statistics::total_amount;
use crate::temporal::{distance_millis, is_before};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Amounts closer than this are "the same" for matching
const AMOUNT_TOLERANCE: f64 = 0.01;

/// Group confidence counted as high in duplicate stats
const HIGH_CONFIDENCE: u8 = 80;

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Exact normalized name, amount within a cent, within 5 minutes,
    /// methods equal or either unset
    #[default]
    Strict,

    /// Name similarity above threshold, amount within a cent, within 24 hours
    Fuzzy,
}

impl MatchStrategy {
    /// Widest time distance still considered the same event
    pub fn window_millis(&self) -> i64 {
        match self {
            MatchStrategy::Strict => 5 * MINUTE_MS,
            MatchStrategy::Fuzzy => 24 * HOUR_MS,
        }
    }
}

// ============================================================================
// RESULTS & RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub original: Transaction,
    pub duplicates: Vec<Transaction>,
    /// 0-100
    pub confidence: u8,
}

impl DuplicateGroup {
    pub fn duplicate_value(&self) -> f64 {
        total_amount(&self.duplicates)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.original.id.as_str())
            .chain(self.duplicates.iter().map(|d| d.id.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoResolveRules {
    /// Keep the newer record of an exact pair
    pub keep_newest: bool,
    /// Only exact duplicates are ever removed; false disables removal
    pub remove_exact: bool,
    /// Groups below this confidence are left alone
    pub min_confidence: u8,
}

impl Default for AutoResolveRules {
    fn default() -> Self {
        AutoResolveRules {
            keep_newest: true,
            remove_exact: true,
            min_confidence: 80,
        }
    }
}

impl AutoResolveRules {
    pub fn with_min_confidence(mut self, min_confidence: u8) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Always delete the duplicate and keep the group's original
    pub fn keep_original(mut self) -> Self {
        self.keep_newest = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStats {
    pub group_count: usize,
    pub duplicate_count: usize,
    pub total_value: f64,
    pub high_confidence_count: usize,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeduplicationEngine {
    /// Candidate predicate used by find_similar / find_all_duplicates
    pub strategy: MatchStrategy,

    /// Minimum name similarity for the fuzzy strategy (default: 0.8)
    pub fuzzy_name_threshold: f64,
}

impl DeduplicationEngine {
    /// Create engine with the strict strategy
    pub fn new() -> Self {
        DeduplicationEngine {
            strategy: MatchStrategy::Strict,
            fuzzy_name_threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn from_settings(settings: &DuplicateSettings) -> Self {
        DeduplicationEngine {
            strategy: MatchStrategy::Strict,
            fuzzy_name_threshold: settings.fuzzy_name_threshold,
        }
    }

    /// Builder pattern: choose the candidate predicate
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Does `candidate` look like the same event as `target`?
    pub fn is_similar(&self, target: &Transaction, candidate: &Transaction) -> bool {
        if candidate.id == target.id {
            return false;
        }

        if (candidate.amount - target.amount).abs() > AMOUNT_TOLERANCE {
            return false;
        }

        match distance_millis(&candidate.date, &target.date) {
            Some(distance) if distance <= self.strategy.window_millis() => {}
            _ => return false,
        }

        match self.strategy {
            MatchStrategy::Strict => {
                candidate.normalized_name() == target.normalized_name()
                    && methods_compatible(candidate, target)
            }
            MatchStrategy::Fuzzy => {
                are_similar(&candidate.name, &target.name, self.fuzzy_name_threshold)
            }
        }
    }

    /// Stored transactions similar to `target`, in store order
    pub fn find_similar<'a>(
        &self,
        target: &Transaction,
        transactions: &'a [Transaction],
    ) -> Vec<&'a Transaction> {
        transactions
            .iter()
            .filter(|candidate| self.is_similar(target, candidate))
            .collect()
    }

    /// Additive score for one pair, clamped to 0-100
    pub fn pair_confidence(&self, original: &Transaction, duplicate: &Transaction) -> u8 {
        let mut score: u32 = 0;

        if original.normalized_name() == duplicate.normalized_name() {
            score += 40;
        }

        if (original.amount - duplicate.amount).abs() < AMOUNT_TOLERANCE {
            score += 30;
        }

        score += match distance_millis(&original.date, &duplicate.date) {
            Some(d) if d < MINUTE_MS => 20,
            Some(d) if d < 5 * MINUTE_MS => 15,
            Some(d) if d < HOUR_MS => 10,
            _ => 0,
        };

        if let (Some(a), Some(b)) = (&original.method, &duplicate.method) {
            if a == b {
                score += 10;
            }
        }

        score.min(100) as u8
    }

    /// Best pair score across all candidates (0 when there are none)
    pub fn confidence(&self, target: &Transaction, candidates: &[&Transaction]) -> u8 {
        candidates
            .iter()
            .map(|candidate| self.pair_confidence(target, candidate))
            .max()
            .unwrap_or(0)
    }

    /// Group the whole store. No id appears in two groups; groups come back
    /// by descending confidence, store order among equals.
    pub fn find_all_duplicates(&self, transactions: &[Transaction]) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        let mut processed: HashSet<&str> = HashSet::new();

        for tx in transactions {
            if processed.contains(tx.id.as_str()) {
                continue;
            }

            let similar: Vec<&Transaction> = self
                .find_similar(tx, transactions)
                .into_iter()
                .filter(|candidate| !processed.contains(candidate.id.as_str()))
                .collect();

            if similar.is_empty() {
                continue;
            }

            let confidence = self.confidence(tx, &similar);
            processed.insert(tx.id.as_str());
            processed.extend(similar.iter().map(|s| s.id.as_str()));

            groups.push(DuplicateGroup {
                original: tx.clone(),
                duplicates: similar.into_iter().cloned().collect(),
                confidence,
            });
        }

        groups.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        tracing::debug!(groups = groups.len(), "duplicate sweep finished");
        groups
    }

    /// Same name, amount, method (both unset counts as equal) and < 1 minute apart
    pub fn is_exact_duplicate(&self, a: &Transaction, b: &Transaction) -> bool {
        a.normalized_name() == b.normalized_name()
            && (a.amount - b.amount).abs() < AMOUNT_TOLERANCE
            && a.method == b.method
            && matches!(distance_millis(&a.date, &b.date), Some(d) if d < MINUTE_MS)
    }

    /// Ids auto-resolution would delete, without touching the store
    pub fn resolution_plan(&self, transactions: &[Transaction], rules: &AutoResolveRules) -> Vec<String> {
        if !rules.remove_exact {
            return Vec::new();
        }

        let mut doomed = Vec::new();
        for group in self.find_all_duplicates(transactions) {
            if group.confidence < rules.min_confidence {
                continue;
            }

            for duplicate in &group.duplicates {
                if !self.is_exact_duplicate(&group.original, duplicate) {
                    continue;
                }

                // keep_newest: only drop the duplicate when it is the older one
                if !rules.keep_newest || is_before(&duplicate.date, &group.original.date) {
                    doomed.push(duplicate.id.clone());
                }
            }
        }

        doomed
    }

    /// Delete exact duplicates per `rules`. Irreversible. Returns how many
    /// records were removed.
    pub fn auto_resolve(&self, transactions: &mut Vec<Transaction>, rules: &AutoResolveRules) -> usize {
        let doomed: HashSet<String> = self
            .resolution_plan(transactions, rules)
            .into_iter()
            .collect();

        let before = transactions.len();
        transactions.retain(|tx| !doomed.contains(&tx.id));
        let removed = before - transactions.len();

        if removed > 0 {
            tracing::info!(removed, min_confidence = rules.min_confidence, "auto-resolved duplicates");
        }
        removed
    }

    pub fn stats(&self, transactions: &[Transaction]) -> DuplicateStats {
        let groups = self.find_all_duplicates(transactions);

        DuplicateStats {
            group_count: groups.len(),
            duplicate_count: groups.iter().map(|g| g.duplicates.len()).sum(),
            total_value: groups
                .iter()
                .fold(0.0, |total, g| total + g.duplicate_value()),
            high_confidence_count: groups
                .iter()
                .filter(|g| g.confidence >= HIGH_CONFIDENCE)
                .count(),
        }
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Equal, or at least one side unset
fn methods_compatible(a: &Transaction, b: &Transaction) -> bool {
    match (&a.method, &b.method) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TransactionInput;
    use chrono::Utc;

    fn create_test_transaction(name: &str, amount: f64, date: &str, method: Option<&str>) -> Transaction {
        let mut input = TransactionInput::new(name, amount, date);
        if let Some(method) = method {
            input = input.with_method(method);
        }
        Transaction::from_input(input, Utc::now())
    }

    #[test]
    fn test_strict_similarity() {
        let engine = DeduplicationEngine::new();
        let a = create_test_transaction("Padaria ABC", 10.0, "2024-07-01", None);

        let close = create_test_transaction("  padaria abc", 10.005, "2024-07-01T00:04:59", Some("PIX"));
        assert!(engine.is_similar(&a, &close));

        let late = create_test_transaction("Padaria ABC", 10.0, "2024-07-01T00:05:01", None);
        assert!(!engine.is_similar(&a, &late));

        let other_amount = create_test_transaction("Padaria ABC", 10.02, "2024-07-01", None);
        assert!(!engine.is_similar(&a, &other_amount));

        // Never similar to itself
        assert!(!engine.is_similar(&a, &a));
    }

    #[test]
    fn test_method_must_agree_when_both_set() {
        let engine = DeduplicationEngine::new();
        let a = create_test_transaction("Loja", 50.0, "2024-07-01T10:00:00", Some("PIX"));
        let b = create_test_transaction("Loja", 50.0, "2024-07-01T10:01:00", Some("Crédito"));
        let c = create_test_transaction("Loja", 50.0, "2024-07-01T10:01:00", None);

        assert!(!engine.is_similar(&a, &b));
        assert!(engine.is_similar(&a, &c));
    }

    #[test]
    fn test_confidence_two_minutes_apart() {
        let engine = DeduplicationEngine::new();
        let stored = vec![create_test_transaction("Padaria ABC", 10.0, "2024-07-01", None)];
        let incoming = create_test_transaction("padaria abc", 10.0, "2024-07-01T00:02:00", None);

        let similar = engine.find_similar(&incoming, &stored);
        assert_eq!(similar.len(), 1);
        // name 40 + amount 30 + under 5 minutes 15, no method points
        assert_eq!(engine.confidence(&incoming, &similar), 85);
    }

    #[test]
    fn test_confidence_is_max_over_candidates() {
        let engine = DeduplicationEngine::new();
        let target = create_test_transaction("Loja", 20.0, "2024-07-01T12:00:00", Some("PIX"));
        let far = create_test_transaction("Loja", 20.0, "2024-07-01T12:04:00", None);
        let near = create_test_transaction("Loja", 20.0, "2024-07-01T12:00:30", Some("PIX"));

        assert_eq!(engine.confidence(&target, &[&far, &near]), 100);
        assert_eq!(engine.confidence(&target, &[&far]), 85);
        assert_eq!(engine.confidence(&target, &[]), 0);
    }

    #[test]
    fn test_confidence_stays_in_bounds() {
        let engine = DeduplicationEngine::new();
        let samples = [
            create_test_transaction("A", 1.0, "2024-07-01", Some("PIX")),
            create_test_transaction("a", 1.0, "2024-07-01", Some("PIX")),
            create_test_transaction("B", 999_999.99, "2024-07-01T00:30:00", None),
            create_test_transaction("A", 1.0, "not a date", Some("PIX")),
            create_test_transaction("A", 1.0, "2023-01-01", Some("Débito")),
        ];

        for a in &samples {
            for b in &samples {
                assert!(engine.pair_confidence(a, b) <= 100);
            }
        }
    }

    #[test]
    fn test_unparseable_dates_never_match() {
        let engine = DeduplicationEngine::new();
        let a = create_test_transaction("Loja", 5.0, "amanhã", None);
        let b = create_test_transaction("Loja", 5.0, "amanhã", None);
        assert!(!engine.is_similar(&a, &b));
    }

    #[test]
    fn test_groups_never_share_ids() {
        let engine = DeduplicationEngine::new();
        // Chain: each record is 3 minutes from the next, so the first and
        // last are 6 minutes apart and only related through the middle one
        let store = vec![
            create_test_transaction("Uber", 15.0, "2024-07-01T08:00:00", None),
            create_test_transaction("Uber", 15.0, "2024-07-01T08:03:00", None),
            create_test_transaction("Uber", 15.0, "2024-07-01T08:06:00", None),
            create_test_transaction("Uber", 15.0, "2024-07-01T08:09:00", None),
        ];

        let groups = engine.find_all_duplicates(&store);

        let mut seen = HashSet::new();
        for group in &groups {
            for id in group.member_ids() {
                assert!(seen.insert(id.to_string()), "id {} in two groups", id);
            }
        }
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_groups_sorted_by_confidence() {
        let engine = DeduplicationEngine::new();
        let store = vec![
            create_test_transaction("Posto", 100.0, "2024-07-01T10:00:00", None),
            create_test_transaction("Posto", 100.0, "2024-07-01T10:04:00", None),
            create_test_transaction("Mercado", 42.0, "2024-07-02T10:00:00", Some("PIX")),
            create_test_transaction("Mercado", 42.0, "2024-07-02T10:00:10", Some("PIX")),
            create_test_transaction("Cinema", 30.0, "2024-07-03", None),
        ];

        let groups = engine.find_all_duplicates(&store);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].original.name, "Mercado");
        assert_eq!(groups[0].confidence, 100);
        assert_eq!(groups[1].confidence, 85);
    }

    #[test]
    fn test_fuzzy_strategy_widens_window_and_name() {
        let strict = DeduplicationEngine::new();
        let fuzzy = DeduplicationEngine::new().with_strategy(MatchStrategy::Fuzzy);

        let a = create_test_transaction("Padaria ABC", 10.0, "2024-07-01T08:00:00", Some("PIX"));
        let b = create_test_transaction("Padaria A8C", 10.0, "2024-07-01T20:00:00", Some("Débito"));

        assert!(!strict.is_similar(&a, &b));
        assert!(fuzzy.is_similar(&a, &b));

        let next_week = create_test_transaction("Padaria ABC", 10.0, "2024-07-08", None);
        assert!(!fuzzy.is_similar(&a, &next_week));
    }

    #[test]
    fn test_exact_duplicate_predicate() {
        let engine = DeduplicationEngine::new();
        let a = create_test_transaction("Loja", 10.0, "2024-07-01T10:00:00", None);
        let b = create_test_transaction("LOJA", 10.0, "2024-07-01T10:00:59", None);
        let c = create_test_transaction("Loja", 10.0, "2024-07-01T10:00:30", Some("PIX"));
        let d = create_test_transaction("Loja", 10.0, "2024-07-01T10:01:00", None);

        assert!(engine.is_exact_duplicate(&a, &b));
        // Unset vs set method is compatible for similarity but not exact
        assert!(!engine.is_exact_duplicate(&a, &c));
        assert!(!engine.is_exact_duplicate(&a, &d));
    }

    #[test]
    fn test_auto_resolve_keeps_newest() {
        let engine = DeduplicationEngine::new();
        // Newer record stored first, so it is the group's original
        let mut store = vec![
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:30", Some("PIX")),
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:00", Some("PIX")),
        ];
        let newer_id = store[0].id.clone();

        let removed = engine.auto_resolve(&mut store, &AutoResolveRules::default());

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store[0].id, newer_id);
    }

    #[test]
    fn test_auto_resolve_keep_newest_leaves_older_original() {
        let engine = DeduplicationEngine::new();
        let mut store = vec![
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:00", Some("PIX")),
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:30", Some("PIX")),
        ];

        // The duplicate is the newer one: nothing is deleted
        assert_eq!(engine.auto_resolve(&mut store, &AutoResolveRules::default()), 0);
        assert_eq!(store.len(), 2);

        let removed = engine.auto_resolve(&mut store, &AutoResolveRules::default().keep_original());
        assert_eq!(removed, 1);
        assert_eq!(store[0].date, "2024-07-03T10:00:00");
    }

    #[test]
    fn test_auto_resolve_respects_confidence_and_flags() {
        let engine = DeduplicationEngine::new();
        let store = vec![
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:30", None),
            create_test_transaction("Mercado", 42.0, "2024-07-03T10:00:00", None),
        ];

        // 40 + 30 + 20 = 90
        let strict_rules = AutoResolveRules::default().with_min_confidence(95);
        assert!(engine.resolution_plan(&store, &strict_rules).is_empty());

        let disabled = AutoResolveRules {
            remove_exact: false,
            ..AutoResolveRules::default()
        };
        assert!(engine.resolution_plan(&store, &disabled).is_empty());

        assert_eq!(engine.resolution_plan(&store, &AutoResolveRules::default()).len(), 1);
    }

    #[test]
    fn test_stats() {
        let engine = DeduplicationEngine::new();
        let store = vec![
            create_test_transaction("Posto", 100.0, "2024-07-01T10:00:00", None),
            create_test_transaction("Posto", 100.0, "2024-07-01T10:04:00", None),
            create_test_transaction("Posto", 100.0, "2024-07-01T10:02:00", None),
            create_test_transaction("Cinema", 30.0, "2024-07-03", None),
        ];

        let stats = engine.stats(&store);
        assert_eq!(stats.group_count, 1);
        assert_eq!(stats.duplicate_count, 2);
        assert_eq!(stats.total_value, 200.0);
        assert_eq!(stats.high_confidence_count, 1);
    }
}
