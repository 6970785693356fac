// 🏷️ Category Registry - user-editable category -> subcategories table
//
// Categories are unique by exact name. Subcategory order is display order.
// Renames and deletions are pushed down to the transactions that reference
// them; the caller passes the store in explicitly.

use crate::db::Transaction;
use crate::error::{FinanceError, FinanceResult};
use crate::rules::default_rules;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Category {
    pub fn new(name: &str, subcategories: &[&str]) -> Self {
        Category {
            name: name.to_string(),
            subcategories: subcategories.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn has_subcategory(&self, subcategory: &str) -> bool {
        self.subcategories.iter().any(|s| s == subcategory)
    }
}

// ============================================================================
// PREDEFINED SETS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedSet {
    Default,
    Business,
    Personal,
}

impl PredefinedSet {
    pub fn categories(&self) -> Vec<Category> {
        match self {
            PredefinedSet::Default => default_rules()
                .into_iter()
                .map(|rule| Category {
                    name: rule.category,
                    subcategories: rule.subcategories,
                })
                .collect(),
            PredefinedSet::Business => vec![
                Category::new("Receitas", &["Vendas", "Serviços", "Juros", "Outros"]),
                Category::new(
                    "Despesas Operacionais",
                    &["Fornecedores", "Salários", "Aluguel", "Utilities"],
                ),
                Category::new("Marketing", &["Publicidade", "Eventos", "Material"]),
                Category::new("Administração", &["Contabilidade", "Jurídico", "Seguros"]),
            ],
            PredefinedSet::Personal => vec![
                Category::new("Essenciais", &["Alimentação", "Moradia", "Transporte", "Saúde"]),
                Category::new("Lifestyle", &["Lazer", "Compras", "Educação"]),
                Category::new("Investimentos", &["Poupança", "Ações", "Fundos"]),
            ],
        }
    }
}

impl FromStr for PredefinedSet {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(PredefinedSet::Default),
            "business" => Ok(PredefinedSet::Business),
            "personal" => Ok(PredefinedSet::Personal),
            other => Err(FinanceError::NotFound(format!("category set {}", other))),
        }
    }
}

// ============================================================================
// USAGE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub count: usize,
    pub total: f64,
    pub subcategories: BTreeMap<String, Usage>,
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        CategoryRegistry::default()
    }

    /// Registry seeded with the built-in categories
    pub fn with_defaults() -> Self {
        CategoryRegistry::from_categories(PredefinedSet::Default.categories())
    }

    pub fn from_categories(categories: Vec<Category>) -> Self {
        CategoryRegistry { categories }
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    pub fn count(&self) -> usize {
        self.categories.len()
    }

    pub fn find(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    fn find_mut(&mut self, name: &str) -> FinanceResult<&mut Category> {
        self.categories
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| FinanceError::NotFound(format!("category {}", name)))
    }

    pub fn add(&mut self, name: &str, subcategories: Vec<String>) -> FinanceResult<&Category> {
        let name = required_name(name)?;
        if self.find(&name).is_some() {
            return Err(FinanceError::AlreadyExists(name));
        }

        self.categories.push(Category {
            name,
            subcategories: clean_list(subcategories),
        });
        Ok(&self.categories[self.categories.len() - 1])
    }

    /// Rename and/or replace subcategories. Transactions filed under the old
    /// name follow the rename. Returns how many transactions were rewritten.
    pub fn update(
        &mut self,
        old_name: &str,
        new_name: &str,
        subcategories: Vec<String>,
        transactions: &mut [Transaction],
    ) -> FinanceResult<usize> {
        let new_name = required_name(new_name)?;
        if new_name != old_name && self.find(&new_name).is_some() {
            return Err(FinanceError::AlreadyExists(new_name));
        }

        let category = self.find_mut(old_name)?;
        category.name = new_name.clone();
        category.subcategories = clean_list(subcategories);

        if new_name == old_name {
            return Ok(0);
        }

        let mut rewritten = 0;
        for tx in transactions
            .iter_mut()
            .filter(|tx| tx.category.as_deref() == Some(old_name))
        {
            tx.category = Some(new_name.clone());
            rewritten += 1;
        }
        Ok(rewritten)
    }

    /// Remove a category; its transactions become uncategorized.
    /// Returns how many transactions were cleared.
    pub fn delete(&mut self, name: &str, transactions: &mut [Transaction]) -> FinanceResult<usize> {
        let before = self.categories.len();
        self.categories.retain(|c| c.name != name);
        if self.categories.len() == before {
            return Err(FinanceError::NotFound(format!("category {}", name)));
        }

        let mut cleared = 0;
        for tx in transactions
            .iter_mut()
            .filter(|tx| tx.category.as_deref() == Some(name))
        {
            tx.category = None;
            tx.subcategory = None;
            cleared += 1;
        }
        Ok(cleared)
    }

    pub fn add_subcategory(&mut self, category: &str, subcategory: &str) -> FinanceResult<()> {
        let subcategory = required_name(subcategory)?;
        let entry = self.find_mut(category)?;
        if entry.has_subcategory(&subcategory) {
            return Err(FinanceError::AlreadyExists(subcategory));
        }
        entry.subcategories.push(subcategory);
        Ok(())
    }

    /// Returns how many transactions lost the subcategory
    pub fn remove_subcategory(
        &mut self,
        category: &str,
        subcategory: &str,
        transactions: &mut [Transaction],
    ) -> FinanceResult<usize> {
        let entry = self.find_mut(category)?;
        let before = entry.subcategories.len();
        entry.subcategories.retain(|s| s != subcategory);
        if entry.subcategories.len() == before {
            return Err(FinanceError::NotFound(format!(
                "subcategory {} in {}",
                subcategory, category
            )));
        }

        let mut cleared = 0;
        for tx in transactions.iter_mut().filter(|tx| {
            tx.category.as_deref() == Some(category) && tx.subcategory.as_deref() == Some(subcategory)
        }) {
            tx.subcategory = None;
            cleared += 1;
        }
        Ok(cleared)
    }

    /// Count and total per registered category (and its subcategories).
    /// Transactions filed under unknown categories are ignored.
    pub fn usage_stats(&self, transactions: &[Transaction]) -> BTreeMap<String, CategoryUsage> {
        let mut stats: BTreeMap<String, CategoryUsage> = self
            .categories
            .iter()
            .map(|c| (c.name.clone(), CategoryUsage::default()))
            .collect();

        for tx in transactions {
            let Some(usage) = tx.category.as_ref().and_then(|c| stats.get_mut(c)) else {
                continue;
            };
            usage.count += 1;
            usage.total += tx.amount;

            if let Some(subcategory) = &tx.subcategory {
                let sub = usage.subcategories.entry(subcategory.clone()).or_default();
                sub.count += 1;
                sub.total += tx.amount;
            }
        }

        stats
    }

    /// Add every category of `set` not already present. Returns how many were added.
    pub fn import_predefined(&mut self, set: PredefinedSet) -> usize {
        let mut added = 0;
        for category in set.categories() {
            if self.find(&category.name).is_none() {
                self.categories.push(category);
                added += 1;
            }
        }
        added
    }
}

fn required_name(name: &str) -> FinanceResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FinanceError::Validation(vec![
            crate::schema::ValidationError::new("name", "Required field is empty"),
        ]));
    }
    Ok(name.to_string())
}

/// Trim, drop empties and repeated names, keep order
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
