// 📥 Import helpers
// CSV statements and free-text receipts become TransactionInput records.
// Nothing here stores anything: imported records go through
// AppState::import_transactions like any manual entry.

use crate::db::{Source, TransactionInput};
use crate::temporal::normalize_date;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Payment method labels, checked in order against lower-cased text
const PAYMENT_METHODS: [(&str, &str); 9] = [
    ("samsung pay", "Samsung Pay"),
    ("apple pay", "Apple Pay"),
    ("google pay", "Google Pay"),
    ("cartão físico", "Cartão Físico"),
    ("pix", "PIX"),
    ("débito", "Cartão de Débito"),
    ("crédito", "Cartão de Crédito"),
    ("dinheiro", "Dinheiro"),
    ("transferência", "Transferência"),
];

const DEFAULT_PAYMENT_METHOD: &str = "Cartão de Crédito";

// ============================================================================
// MONETARY VALUES & PAYMENT METHODS
// ============================================================================

/// "R$ 1.234,56" -> 1234.56. Anything unreadable is 0.
///
/// Dots are thousand separators only when a decimal comma is also present;
/// otherwise "10.50" is read as ten and a half.
pub fn parse_monetary_value(text: &str) -> f64 {
    let cleaned: String = text
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replacen(',', ".", 1)
    } else {
        cleaned
    };

    numeric_prefix(&normalized)
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Longest leading "-?digits(.digits)?" slice
fn numeric_prefix(text: &str) -> Option<&str> {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in text.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    seen_digit.then(|| text[..end].trim_end_matches('.'))
}

/// Payment method named in receipt text; credit card when nothing matches
pub fn detect_payment_method(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    PAYMENT_METHODS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| *label)
        .unwrap_or(DEFAULT_PAYMENT_METHOD)
}

// ============================================================================
// CSV
// ============================================================================

/// One statement row. Columns beyond name/amount/date are optional.
#[derive(Debug, Deserialize)]
struct CsvRow {
    name: String,
    amount: String,
    date: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl CsvRow {
    fn into_input(self) -> TransactionInput {
        TransactionInput {
            name: self.name,
            amount: parse_monetary_value(&self.amount),
            date: normalize_date(&self.date),
            method: self.method,
            category: self.category,
            subcategory: self.subcategory,
            notes: self.notes,
            source: Source::Imported,
            ..Default::default()
        }
    }
}

/// Parse `name,amount,date[,method,category,subcategory,notes]` rows
pub fn parse_csv<R: Read>(reader: R, label: &str) -> Result<Vec<TransactionInput>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut inputs = Vec::new();
    for (line_num, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| {
            // +2: 1-indexed plus the header row
            format!("Failed to parse CSV line {} in {}", line_num + 2, label)
        })?;
        inputs.push(row.into_input());
    }

    Ok(inputs)
}

pub fn load_csv(file_path: &Path) -> Result<Vec<TransactionInput>> {
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let label = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    parse_csv(file, &label)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_monetary_value() {
        assert_eq!(parse_monetary_value("R$ 100,00"), 100.0);
        assert_eq!(parse_monetary_value("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_monetary_value("10.50"), 10.5);
        assert_eq!(parse_monetary_value(" 42 "), 42.0);
        assert_eq!(parse_monetary_value("-R$ 5,00"), -5.0);
        assert_eq!(parse_monetary_value("12,5 reais"), 12.5);
        assert_eq!(parse_monetary_value("abc"), 0.0);
        assert_eq!(parse_monetary_value(""), 0.0);
    }

    #[test]
    fn test_detect_payment_method() {
        assert_eq!(detect_payment_method("Pagamento via PIX"), "PIX");
        assert_eq!(detect_payment_method("APPLE PAY ****1234"), "Apple Pay");
        assert_eq!(detect_payment_method("Cartão de Débito"), "Cartão de Débito");
        assert_eq!(detect_payment_method("sem pista"), "Cartão de Crédito");
    }

    #[test]
    fn test_parse_csv_rows() {
        let data = "\
name,amount,date,method,category
Posto Shell,\"R$ 150,00\",2024-07-02,PIX,
Padaria ABC,10.5,2024-07-01T08:00:00,,Alimentação
";
        let inputs = parse_csv(data.as_bytes(), "test.csv").unwrap();

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].name, "Posto Shell");
        assert_eq!(inputs[0].amount, 150.0);
        assert_eq!(inputs[0].method.as_deref(), Some("PIX"));
        assert_eq!(inputs[0].source, Source::Imported);
        assert_eq!(inputs[1].category.as_deref(), Some("Alimentação"));
        assert_eq!(inputs[1].date, "2024-07-01T08:00:00");
    }

    #[test]
    fn test_parse_csv_normalizes_dates() {
        let data = "name,amount,date\nFarmácia,\"R$ 42,90\",03/07/2024\n";
        let inputs = parse_csv(data.as_bytes(), "br.csv").unwrap();

        assert_eq!(inputs[0].date, "2024-07-03");
        assert_eq!(inputs[0].amount, 42.9);
    }

    #[test]
    fn test_parse_csv_reports_line() {
        let data = "name,amount\nLoja,10\n";
        let err = parse_csv(data.as_bytes(), "bad.csv").unwrap_err();
        assert!(err.to_string().contains("line 2 in bad.csv"));
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,amount,date").unwrap();
        writeln!(file, "Cinema,30,2024-07-03").unwrap();

        let inputs = load_csv(file.path()).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].amount, 30.0);

        let missing = load_csv(Path::new("/nope/missing.csv")).unwrap_err();
        assert!(missing.to_string().contains("Failed to open file"));
    }
}
