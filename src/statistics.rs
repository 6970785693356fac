// 📊 Statistics - read-side projections over the store
// Every function here scans the slice it is given. Nothing is cached.

use crate::db::Transaction;
use crate::format::format_currency;
use crate::temporal::{in_period, month_key, parse_date, parse_timestamp};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weekday labels, Sunday first
const WEEKDAY_NAMES: [&str; 7] = [
    "Domingo", "Segunda", "Terça", "Quarta", "Quinta", "Sexta", "Sábado",
];

/// A payee seen more often than this gets a suggestion
const FREQUENT_PAYEE_MIN: usize = 3;

// ============================================================================
// OVERALL STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: f64,
    pub count: usize,
    pub average: f64,
    /// Uncategorized records are left out
    pub category_totals: BTreeMap<String, f64>,
    pub largest: f64,
    pub smallest: f64,
}

impl Statistics {
    pub fn compute(transactions: &[Transaction]) -> Self {
        let count = transactions.len();
        if count == 0 {
            return Statistics::default();
        }

        let total = total_amount(transactions);
        let largest = transactions
            .iter()
            .map(|t| t.amount)
            .fold(f64::MIN, f64::max);
        let smallest = transactions
            .iter()
            .map(|t| t.amount)
            .fold(f64::MAX, f64::min);

        Statistics {
            total,
            count,
            average: total / count as f64,
            category_totals: category_totals(transactions),
            largest,
            smallest,
        }
    }
}

/// Sum of amounts. Starts at +0.0 so an empty set never reads as "-0".
pub fn total_amount<'a, I>(transactions: I) -> f64
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .fold(0.0, |total, tx| total + tx.amount)
}

pub fn category_totals(transactions: &[Transaction]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for tx in transactions {
        if let Some(category) = &tx.category {
            *totals.entry(category.clone()).or_insert(0.0) += tx.amount;
        }
    }
    totals
}

/// Categories by descending total, ties by name
pub fn top_categories(transactions: &[Transaction], limit: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = category_totals(transactions).into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// PERIODS
// ============================================================================

/// Transactions whose stored date starts with `key` ("YYYY-MM")
pub fn monthly_transactions<'a>(transactions: &'a [Transaction], key: &str) -> Vec<&'a Transaction> {
    transactions
        .iter()
        .filter(|t| in_period(&t.date, key))
        .collect()
}

pub fn monthly_total(transactions: &[Transaction], key: &str) -> f64 {
    total_amount(transactions.iter().filter(|t| in_period(&t.date, key)))
}

/// Calendar range, both ends inclusive. Unparseable dates never match.
pub fn transactions_between(
    transactions: &[Transaction],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&Transaction> {
    transactions
        .iter()
        .filter(|t| matches!(parse_date(&t.date), Some(d) if d >= start && d <= end))
        .collect()
}

/// Monthly total spread over the days elapsed so far
pub fn daily_average(transactions: &[Transaction], today: NaiveDate) -> f64 {
    let monthly = monthly_transactions(transactions, &month_key(today));
    if monthly.is_empty() {
        return 0.0;
    }
    total_amount(monthly) / f64::from(today.day())
}

/// The `limit` most recent records by date, newest first
pub fn recent(transactions: &[Transaction], limit: usize) -> Vec<&Transaction> {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by(|a, b| parse_timestamp(&b.date).cmp(&parse_timestamp(&a.date)));
    sorted.truncate(limit);
    sorted
}

/// Transactions dated exactly on `day`
pub fn spent_on(transactions: &[Transaction], day: NaiveDate) -> f64 {
    total_amount(transactions.iter().filter(|t| parse_date(&t.date) == Some(day)))
}

/// Most frequent payee label and its count
pub fn most_frequent_payee(transactions: &[Transaction]) -> Option<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tx in transactions {
        *counts.entry(tx.name.as_str()).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, count)| (name.to_string(), count))
}

// ============================================================================
// INSIGHTS & SUGGESTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsightKind {
    DayOfWeek,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub message: String,
}

/// Weekday with the most spending, and month-over-month change
pub fn spending_insights(transactions: &[Transaction]) -> Vec<Insight> {
    let mut insights = Vec::new();

    let mut day_totals = [0.0_f64; 7];
    let mut any_day = false;
    for tx in transactions {
        if let Some(date) = parse_date(&tx.date) {
            day_totals[date.weekday().num_days_from_sunday() as usize] += tx.amount;
            any_day = true;
        }
    }

    if any_day {
        let mut top = 0;
        for (day, total) in day_totals.iter().enumerate() {
            if *total > day_totals[top] {
                top = day;
            }
        }
        insights.push(Insight {
            kind: InsightKind::DayOfWeek,
            title: "Dia da Semana com Mais Gastos".to_string(),
            message: format!(
                "Você gasta mais às {}s: {}",
                WEEKDAY_NAMES[top],
                format_currency(day_totals[top])
            ),
        });
    }

    let mut month_totals: BTreeMap<&str, f64> = BTreeMap::new();
    for tx in transactions {
        if let Some(month) = tx.date.get(..7) {
            *month_totals.entry(month).or_insert(0.0) += tx.amount;
        }
    }

    let mut latest = month_totals.values().rev();
    if let (Some(current), Some(previous)) = (latest.next(), latest.next()) {
        if *previous > 0.0 {
            let change = (current - previous) / previous * 100.0;
            insights.push(Insight {
                kind: InsightKind::Trend,
                title: "Tendência Mensal".to_string(),
                message: format!(
                    "Seus gastos {} {:.1}% em relação ao mês anterior",
                    if change > 0.0 { "aumentaram" } else { "diminuíram" },
                    change.abs()
                ),
            });
        }
    }

    insights
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub title: String,
    pub message: String,
}

/// Advice derived from the store and the current goal progress
pub fn suggestions(transactions: &[Transaction], goal_progress: f64) -> Vec<Suggestion> {
    let mut out = Vec::new();

    if let Some((category, total)) = top_categories(transactions, 1).into_iter().next() {
        out.push(Suggestion {
            kind: SuggestionKind::Warning,
            title: "Categoria com Maior Gasto".to_string(),
            message: format!(
                "Você gastou {} em {}. Considere revisar esses gastos.",
                format_currency(total),
                category
            ),
        });
    }

    if goal_progress > 80.0 {
        out.push(Suggestion {
            kind: SuggestionKind::Danger,
            title: "Meta Quase Atingida".to_string(),
            message: format!(
                "Você já gastou {:.1}% da sua meta mensal. Cuidado com os próximos gastos.",
                goal_progress
            ),
        });
    } else if goal_progress > 50.0 {
        out.push(Suggestion {
            kind: SuggestionKind::Info,
            title: "Meta em Andamento".to_string(),
            message: format!(
                "Você está no meio do caminho da sua meta mensal ({:.1}%).",
                goal_progress
            ),
        });
    }

    if let Some((name, count)) = most_frequent_payee(transactions) {
        if count > FREQUENT_PAYEE_MIN {
            out.push(Suggestion {
                kind: SuggestionKind::Info,
                title: "Transação Frequente".to_string(),
                message: format!(
                    "Você tem {} transações em \"{}\". Considere criar uma categoria específica.",
                    count, name
                ),
            });
        }
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================
