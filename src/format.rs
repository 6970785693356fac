// pt-BR display helpers used by notices and assistant answers

use crate::temporal::parse_date;

/// Format an amount as Brazilian reais: `R$ 1.234,56`
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!(
        "{}R$ {},{:02}",
        if negative { "-" } else { "" },
        grouped,
        fraction
    )
}

/// Format a stored date as dd/mm/yyyy, falling back to the raw text
pub fn format_date(stored: &str) -> String {
    match parse_date(stored) {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => stored.to_string(),
    }
}
