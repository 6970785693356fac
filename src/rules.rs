// 🏷️ Categorization Rules - Rules as Data
// Two layers: a learned exact-match table built from user corrections, then an
// ordered static table of category -> keyword patterns.

use crate::db::{normalize_name, Transaction};
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Confidence reported for a static pattern hit
const PATTERN_CONFIDENCE: f64 = 0.8;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category assigned when any pattern matches
    pub category: String,

    /// Candidate subcategories, in display order
    #[serde(default)]
    pub subcategories: Vec<String>,

    /// Lower-case substrings, checked in declared order
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new(category: &str, subcategories: &[&str], patterns: &[&str]) -> Self {
        CategoryRule {
            category: category.to_string(),
            subcategories: subcategories.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// First pattern contained in the (already normalized) name
    pub fn matching_pattern(&self, normalized: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| !p.is_empty() && normalized.contains(p.as_str()))
            .map(String::as_str)
    }

    /// First subcategory whose lower-cased name occurs in the label
    pub fn find_subcategory(&self, normalized: &str) -> Option<&str> {
        self.subcategories
            .iter()
            .find(|sub| normalized.contains(&sub.to_lowercase()))
            .map(String::as_str)
    }
}

/// The built-in table. Order matters: the first category with a matching
/// pattern wins, so "barbearia" lands in Alimentação through "bar".
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Alimentação",
            &["Restaurante", "Supermercado", "Delivery", "Padaria", "Lanchonete"],
            &[
                "restaurante", "supermercado", "delivery", "ifood", "padaria", "lanchonete",
                "bar", "cafe", "pizzaria", "hamburgueria", "sorveteria", "açougue",
                "hortifruti", "empório",
            ],
        ),
        CategoryRule::new(
            "Transporte",
            &["Combustível", "Uber", "Transporte Público", "Estacionamento", "Pedágio"],
            &[
                "posto", "combustivel", "gasolina", "alcool", "uber", "taxi", "onibus",
                "metro", "estacionamento", "pedagio", "shell", "petrobras", "ipiranga",
            ],
        ),
        CategoryRule::new(
            "Lazer",
            &["Cinema", "Entretenimento", "Esportes", "Viagem", "Livros"],
            &[
                "cinema", "teatro", "show", "festa", "viagem", "hotel", "pousada", "livro",
                "livraria", "jogo", "parque", "museu", "netflix", "spotify", "amazon prime",
                "bar", "balada", "clube",
            ],
        ),
        CategoryRule::new(
            "Compras",
            &["Roupas", "Eletrônicos", "Casa", "Presentes", "Farmácia"],
            &[
                "loja", "magazine", "shopping", "roupa", "sapato", "eletronicos", "farmacia",
                "drogaria", "presente", "casa", "decoracao", "mercado livre", "amazon",
                "americanas",
            ],
        ),
        CategoryRule::new(
            "Serviços",
            &["Internet", "Telefone", "Assinaturas", "Bancários", "Profissionais"],
            &[
                "internet", "telefone", "celular", "assinatura", "banco", "tarifa", "anuidade",
                "advogado", "medico", "dentista", "seguro", "plano", "contabilidade",
            ],
        ),
        CategoryRule::new(
            "Saúde",
            &["Médico", "Farmácia", "Exames", "Plano de Saúde", "Academia"],
            &[
                "medico", "hospital", "clinica", "farmacia", "drogaria", "exame",
                "laboratorio", "plano", "saude", "academia", "fisioterapia", "psicologia",
            ],
        ),
        CategoryRule::new(
            "Beleza",
            &["Barbearia", "Salão", "Cosméticos", "Perfumaria"],
            &[
                "barbearia", "salao", "cabelo", "nail", "estetica", "cosmetico", "perfume",
                "maquiagem", "spa",
            ],
        ),
    ]
}

// ============================================================================
// LEARNED PATTERNS
// ============================================================================

/// A user-confirmed name -> category mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub learned_at: DateTime<Utc>,
}

/// Normalized name -> learned pattern
pub type LearnedTable = BTreeMap<String, LearnedPattern>;

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MatchSource {
    Learned,
    Pattern(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub confidence: f64,
    pub source: Option<MatchSource>,
}

impl ClassificationResult {
    pub fn is_match(&self) -> bool {
        self.category.is_some()
    }

    /// Human-readable explanation, as shown next to a suggestion
    pub fn reason(&self) -> Option<String> {
        match &self.source {
            Some(MatchSource::Learned) => Some("Aprendido com suas correções".to_string()),
            Some(MatchSource::Pattern(p)) => Some(format!("Padrão detectado: \"{}\"", p)),
            None => None,
        }
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CategoryRule>,
    learned: LearnedTable,
}

impl RuleEngine {
    /// Create an engine with no static rules and nothing learned
    pub fn new() -> Self {
        RuleEngine::default()
    }

    /// Engine with the built-in pattern table
    pub fn with_defaults() -> Self {
        RuleEngine::from_rules(default_rules())
    }

    /// Create engine from a list of rules (kept in the given order)
    pub fn from_rules(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.patterns = rule.patterns.iter().map(|p| p.to_lowercase()).collect();
                rule
            })
            .collect();

        RuleEngine {
            rules,
            learned: LearnedTable::new(),
        }
    }

    /// Load an ordered pattern table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<CategoryRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(RuleEngine::from_rules(rules))
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn learned(&self) -> &LearnedTable {
        &self.learned
    }

    /// Replace the learned table (loading from storage)
    pub fn set_learned(&mut self, learned: LearnedTable) {
        self.learned = learned;
    }

    /// Classify a free-text label. Learned entries are exact-match only.
    pub fn classify(&self, name: &str) -> ClassificationResult {
        let normalized = normalize_name(name);

        if let Some(learned) = self.learned.get(&normalized) {
            return ClassificationResult {
                category: Some(learned.category.clone()),
                subcategory: learned.subcategory.clone(),
                confidence: 1.0,
                source: Some(MatchSource::Learned),
            };
        }

        for rule in &self.rules {
            if let Some(pattern) = rule.matching_pattern(&normalized) {
                return ClassificationResult {
                    category: Some(rule.category.clone()),
                    subcategory: rule.find_subcategory(&normalized).map(str::to_string),
                    confidence: PATTERN_CONFIDENCE,
                    source: Some(MatchSource::Pattern(pattern.to_string())),
                };
            }
        }

        ClassificationResult::default()
    }

    /// Suggestion for a label being typed; None when nothing matches
    pub fn suggest(&self, name: &str) -> Option<ClassificationResult> {
        let result = self.classify(name);
        result.is_match().then_some(result)
    }

    /// Return `tx` with category/subcategory filled from the tables.
    ///
    /// Unchanged when nothing matches. A pattern hit without a subcategory
    /// hit keeps whatever subcategory the transaction already had.
    pub fn categorize(&self, mut tx: Transaction) -> Transaction {
        let result = self.classify(&tx.name);

        match result.source {
            Some(MatchSource::Learned) => {
                tx.category = result.category;
                tx.subcategory = result.subcategory;
            }
            Some(MatchSource::Pattern(_)) => {
                tx.category = result.category;
                if result.subcategory.is_some() {
                    tx.subcategory = result.subcategory;
                }
            }
            None => {}
        }

        tx
    }

    /// Record a user correction and rewrite every stored transaction with
    /// the same normalized name. Returns how many records were rewritten.
    pub fn learn(
        &mut self,
        name: &str,
        category: &str,
        subcategory: Option<&str>,
        transactions: &mut [Transaction],
        now: DateTime<Utc>,
    ) -> usize {
        let key = normalize_name(name);
        let category = category.trim().to_string();
        let subcategory = subcategory
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        self.learned.insert(
            key.clone(),
            LearnedPattern {
                category: category.clone(),
                subcategory: subcategory.clone(),
                learned_at: now,
            },
        );

        let mut rewritten = 0;
        for tx in transactions.iter_mut().filter(|tx| tx.normalized_name() == key) {
            tx.category = Some(category.clone());
            tx.subcategory = subcategory.clone();
            tx.updated_at = now;
            rewritten += 1;
        }

        tracing::debug!(name = %key, category = %category, rewritten, "learned category");
        rewritten
    }

    /// Drop learned entries pointing at a deleted category
    pub fn forget_category(&mut self, category: &str) -> usize {
        let before = self.learned.len();
        self.learned.retain(|_, pattern| pattern.category != category);
        before - self.learned.len()
    }

    /// Follow a category rename
    pub fn rename_category(&mut self, old: &str, new: &str) {
        for pattern in self.learned.values_mut() {
            if pattern.category == old {
                pattern.category = new.to_string();
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TransactionInput;
    use std::io::Write;

    fn tx(name: &str) -> Transaction {
        Transaction::from_input(TransactionInput::new(name, 10.0, "2024-07-01"), Utc::now())
    }

    #[test]
    fn test_pattern_assigns_category() {
        let engine = RuleEngine::with_defaults();
        let result = engine.categorize(tx("Posto Shell"));

        assert_eq!(result.category, Some("Transporte".to_string()));
        assert_eq!(result.subcategory, None);
    }

    #[test]
    fn test_pattern_refines_subcategory() {
        let engine = RuleEngine::with_defaults();
        let result = engine.categorize(tx("Padaria Pão Quente"));

        assert_eq!(result.category, Some("Alimentação".to_string()));
        assert_eq!(result.subcategory, Some("Padaria".to_string()));
    }

    #[test]
    fn test_declared_order_wins() {
        let engine = RuleEngine::with_defaults();

        // "bar" in Alimentação is checked before "barbearia" in Beleza
        let result = engine.categorize(tx("Barbearia Company"));
        assert_eq!(result.category, Some("Alimentação".to_string()));
    }

    #[test]
    fn test_no_match_leaves_fields() {
        let engine = RuleEngine::with_defaults();
        let mut input = tx("A. Marcos da Silva");
        input.subcategory = Some("Profissionais".to_string());

        let result = engine.categorize(input.clone());
        assert_eq!(result, input);
    }

    #[test]
    fn test_learned_overrides_static() {
        let mut engine = RuleEngine::with_defaults();
        let mut store: Vec<Transaction> = Vec::new();
        engine.learn(
            "restaurante xyz",
            "Lazer",
            Some("Entretenimento"),
            &mut store,
            Utc::now(),
        );

        // "restaurante" would match Alimentação statically
        let result = engine.categorize(tx("Restaurante XYZ"));
        assert_eq!(result.category, Some("Lazer".to_string()));
        assert_eq!(result.subcategory, Some("Entretenimento".to_string()));
    }

    #[test]
    fn test_learned_is_exact_match_only() {
        let mut engine = RuleEngine::new();
        let mut store: Vec<Transaction> = Vec::new();
        engine.learn("restaurante xyz", "Alimentação", None, &mut store, Utc::now());

        assert!(engine.classify("Restaurante XYZ Centro").category.is_none());
        assert!(engine.classify("  RESTAURANTE xyz ").category.is_some());
    }

    #[test]
    fn test_categorize_is_idempotent() {
        let mut engine = RuleEngine::with_defaults();
        let mut store: Vec<Transaction> = Vec::new();
        engine.learn("mercadinho do zé", "Alimentação", Some("Supermercado"), &mut store, Utc::now());

        let once = engine.categorize(tx("Mercadinho do Zé"));
        let twice = engine.categorize(once.clone());
        let thrice = engine.categorize(twice.clone());

        assert_eq!(once, twice);
        assert_eq!(twice, thrice);
        assert_eq!(thrice.subcategory, Some("Supermercado".to_string()));
    }

    #[test]
    fn test_learn_rewrites_matching_transactions() {
        let mut engine = RuleEngine::with_defaults();
        let mut store = vec![tx("Loja X"), tx("  loja x"), tx("Loja XY")];

        let rewritten = engine.learn(
            "LOJA X",
            "Compras",
            Some("Roupas"),
            &mut store,
            Utc::now(),
        );

        assert_eq!(rewritten, 2);
        assert_eq!(store[0].category, Some("Compras".to_string()));
        assert_eq!(store[1].subcategory, Some("Roupas".to_string()));
        assert_eq!(store[2].category, None);
        assert!(engine.learned().contains_key("loja x"));
    }

    #[test]
    fn test_learn_overwrites_previous_entry() {
        let mut engine = RuleEngine::new();
        let mut store: Vec<Transaction> = Vec::new();
        engine.learn("uber", "Transporte", Some("Uber"), &mut store, Utc::now());
        engine.learn("uber", "Serviços", Some(""), &mut store, Utc::now());

        let pattern = &engine.learned()["uber"];
        assert_eq!(pattern.category, "Serviços");
        assert_eq!(pattern.subcategory, None);
        assert_eq!(engine.learned().len(), 1);
    }

    #[test]
    fn test_suggest_reports_confidence_and_reason() {
        let engine = RuleEngine::with_defaults();

        let suggestion = engine.suggest("Auto Posto da Ilha").unwrap();
        assert_eq!(suggestion.confidence, 0.8);
        assert_eq!(suggestion.reason(), Some("Padrão detectado: \"posto\"".to_string()));

        assert!(engine.suggest("zzz").is_none());
    }

    #[test]
    fn test_forget_and_rename_category() {
        let mut engine = RuleEngine::new();
        let mut store: Vec<Transaction> = Vec::new();
        engine.learn("a", "Lazer", None, &mut store, Utc::now());
        engine.learn("b", "Lazer", None, &mut store, Utc::now());
        engine.learn("c", "Compras", None, &mut store, Utc::now());

        engine.rename_category("Compras", "Shopping");
        assert_eq!(engine.learned()["c"].category, "Shopping");

        assert_eq!(engine.forget_category("Lazer"), 2);
        assert_eq!(engine.learned().len(), 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{ "category": "Pets", "subcategories": ["Ração"], "patterns": ["PETSHOP"] }}]"#
        )
        .unwrap();

        let engine = RuleEngine::from_file(file.path()).unwrap();
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(
            engine.classify("Petshop Au Au").category,
            Some("Pets".to_string())
        );
    }
}
