// 🎯 Monthly Goal - progress, closing day and threshold alerts
// Progress is a pure projection of the store, recomputed on every call.
// Only the alert tracker keeps state, and only for the current session.

use crate::db::Transaction;
use crate::events::Severity;
use crate::format::format_currency;
use crate::statistics::monthly_total;
use crate::temporal::{days_to_close, month_key};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Progress at or above which the status band turns to Warning
const WARNING_BAND: f64 = 80.0;

// ============================================================================
// GOAL RECORD
// ============================================================================

/// The single per-installation spending goal; replaced wholesale on save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthlyGoal {
    /// Spending ceiling for the month (0 = no goal)
    pub goal: f64,

    /// Statement closing day of month (1-31)
    pub due_date: u32,

    /// Best day of month to buy on credit (1-31)
    pub best_buy_date: u32,

    /// Progress percentage at which the "approaching" alert fires
    pub alert_percentage: u32,
}

impl Default for MonthlyGoal {
    fn default() -> Self {
        MonthlyGoal {
            goal: 0.0,
            due_date: 15,
            best_buy_date: 20,
            alert_percentage: 80,
        }
    }
}

impl MonthlyGoal {
    pub fn new(goal: f64, due_date: u32, best_buy_date: u32, alert_percentage: u32) -> Self {
        MonthlyGoal {
            goal,
            due_date,
            best_buy_date,
            alert_percentage,
        }
    }

    pub fn is_set(&self) -> bool {
        self.goal > 0.0
    }
}

/// `total / goal * 100`, or 0 when there is no goal
pub fn progress_percent(total: f64, goal: f64) -> f64 {
    if goal > 0.0 {
        (total / goal) * 100.0
    } else {
        0.0
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    OnTrack,
    Warning,
    Exceeded,
}

impl GoalStatus {
    pub fn from_progress(progress: f64) -> Self {
        if progress >= 100.0 {
            GoalStatus::Exceeded
        } else if progress >= WARNING_BAND {
            GoalStatus::Warning
        } else {
            GoalStatus::OnTrack
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    /// "YYYY-MM" the figures refer to
    pub month: String,
    pub monthly_total: f64,
    pub goal: f64,
    pub progress: f64,
    pub remaining: f64,
    pub days_to_close: i64,
    pub best_buy_day: u32,
    pub status: GoalStatus,
}

impl GoalProgress {
    /// Project the store onto the goal for the month containing `today`
    pub fn compute(transactions: &[Transaction], goal: &MonthlyGoal, today: NaiveDate) -> Self {
        let month = month_key(today);
        let total = monthly_total(transactions, &month);
        GoalProgress::from_total(month, total, goal, today)
    }

    pub fn from_total(month: String, total: f64, goal: &MonthlyGoal, today: NaiveDate) -> Self {
        let progress = progress_percent(total, goal.goal);

        GoalProgress {
            month,
            monthly_total: total,
            goal: goal.goal,
            progress,
            remaining: (goal.goal - total).max(0.0),
            days_to_close: days_to_close(today, goal.due_date),
            best_buy_day: goal.best_buy_date,
            status: GoalStatus::from_progress(progress),
        }
    }
}

// ============================================================================
// ALERTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Approaching,
    Exceeded,
}

impl AlertLevel {
    pub fn severity(&self) -> Severity {
        match self {
            AlertLevel::Approaching => Severity::Warning,
            AlertLevel::Exceeded => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalAlert {
    pub level: AlertLevel,
    pub month: String,
    pub progress: f64,
    pub message: String,
}

/// Fires each (month, level) alert at most once per session
#[derive(Debug, Default)]
pub struct AlertTracker {
    seen: HashSet<(String, AlertLevel)>,
}

impl AlertTracker {
    pub fn new() -> Self {
        AlertTracker::default()
    }

    /// Check a fresh projection; returns the alert only the first time its
    /// bucket is crossed. Exceeded takes precedence over Approaching.
    pub fn check(&mut self, progress: &GoalProgress, goal: &MonthlyGoal) -> Option<GoalAlert> {
        if !goal.is_set() {
            return None;
        }

        let (level, message) = if progress.progress >= 100.0 {
            (
                AlertLevel::Exceeded,
                format!(
                    "Meta mensal ultrapassada: {} gastos de {}",
                    format_currency(progress.monthly_total),
                    format_currency(goal.goal)
                ),
            )
        } else if progress.progress >= f64::from(goal.alert_percentage) {
            (
                AlertLevel::Approaching,
                format!(
                    "Atenção: você já usou {:.1}% da meta mensal ({} restantes)",
                    progress.progress,
                    format_currency(progress.remaining)
                ),
            )
        } else {
            return None;
        };

        if !self.seen.insert((progress.month.clone(), level)) {
            return None;
        }

        Some(GoalAlert {
            level,
            month: progress.month.clone(),
            progress: progress.progress,
            message,
        })
    }

    /// Forget everything fired so far
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn has_fired(&self, month: &str, level: AlertLevel) -> bool {
        self.seen.contains(&(month.to_string(), level))
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

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_transaction(amount: f64, date: &str) -> Transaction {
        Transaction::from_input(TransactionInput::new("Loja", amount, date), Utc::now())
    }

    #[test]
    fn test_zero_goal_has_zero_progress() {
        let store = vec![create_test_transaction(500.0, "2024-07-02")];
        let progress = GoalProgress::compute(&store, &MonthlyGoal::default(), date(2024, 7, 10));

        assert_eq!(progress.progress, 0.0);
        assert_eq!(progress.remaining, 0.0);
        assert_eq!(progress.status, GoalStatus::OnTrack);
    }

    #[test]
    fn test_total_equal_to_goal_is_exactly_100() {
        for goal in [1000.0, 333.33, 0.1, 999_999.99] {
            assert_eq!(progress_percent(goal, goal), 100.0, "goal {}", goal);
        }
    }

    #[test]
    fn test_only_current_month_counts() {
        let store = vec![
            create_test_transaction(300.0, "2024-07-01"),
            create_test_transaction(200.0, "2024-07-31T23:59:00"),
            create_test_transaction(999.0, "2024-06-30"),
            create_test_transaction(999.0, "2023-07-15"),
        ];
        let goal = MonthlyGoal::new(1000.0, 15, 20, 80);
        let progress = GoalProgress::compute(&store, &goal, date(2024, 7, 20));

        assert_eq!(progress.month, "2024-07");
        assert_eq!(progress.monthly_total, 500.0);
        assert_eq!(progress.remaining, 500.0);
        assert_eq!(progress.best_buy_day, 20);
        // Past the 15th: closes on Aug 15
        assert_eq!(progress.days_to_close, 26);
    }

    #[test]
    fn test_status_bands() {
        assert_eq!(GoalStatus::from_progress(79.9), GoalStatus::OnTrack);
        assert_eq!(GoalStatus::from_progress(80.0), GoalStatus::Warning);
        assert_eq!(GoalStatus::from_progress(100.0), GoalStatus::Exceeded);
    }

    #[test]
    fn test_approaching_alert_fires_once() {
        let store = vec![create_test_transaction(850.0, "2024-07-05")];
        let goal = MonthlyGoal::new(1000.0, 15, 20, 80);
        let mut tracker = AlertTracker::new();

        let progress = GoalProgress::compute(&store, &goal, date(2024, 7, 10));
        assert!((progress.progress - 85.0).abs() < 1e-9);

        let alert = tracker.check(&progress, &goal).unwrap();
        assert_eq!(alert.level, AlertLevel::Approaching);

        // Recompute in the same session: silent
        let again = GoalProgress::compute(&store, &goal, date(2024, 7, 10));
        assert!(tracker.check(&again, &goal).is_none());
        assert!(tracker.has_fired("2024-07", AlertLevel::Approaching));
    }

    #[test]
    fn test_exceeded_fires_after_approaching() {
        let goal = MonthlyGoal::new(1000.0, 15, 20, 80);
        let mut tracker = AlertTracker::new();
        let mut store = vec![create_test_transaction(850.0, "2024-07-05")];

        let first = GoalProgress::compute(&store, &goal, date(2024, 7, 10));
        assert_eq!(tracker.check(&first, &goal).unwrap().level, AlertLevel::Approaching);

        store.push(create_test_transaction(200.0, "2024-07-06"));
        let second = GoalProgress::compute(&store, &goal, date(2024, 7, 10));
        let alert = tracker.check(&second, &goal).unwrap();
        assert_eq!(alert.level, AlertLevel::Exceeded);
        assert_eq!(alert.level.severity(), Severity::Error);
        assert!(tracker.check(&second, &goal).is_none());
    }

    #[test]
    fn test_reset_rearms_alerts() {
        let store = vec![create_test_transaction(900.0, "2024-07-05")];
        let goal = MonthlyGoal::new(1000.0, 15, 20, 80);
        let mut tracker = AlertTracker::new();
        let progress = GoalProgress::compute(&store, &goal, date(2024, 7, 10));

        assert!(tracker.check(&progress, &goal).is_some());
        tracker.reset();
        assert!(tracker.check(&progress, &goal).is_some());
    }

    #[test]
    fn test_no_alert_without_goal() {
        let goal = MonthlyGoal {
            alert_percentage: 0,
            ..MonthlyGoal::default()
        };
        let progress = GoalProgress::compute(&[], &goal, date(2024, 7, 10));
        assert!(AlertTracker::new().check(&progress, &goal).is_none());
    }

    #[test]
    fn test_goal_serde_camel_case() {
        let goal: MonthlyGoal =
            serde_json::from_str(r#"{ "goal": 1500, "bestBuyDate": 5 }"#).unwrap();
        assert_eq!(goal.goal, 1500.0);
        assert_eq!(goal.best_buy_date, 5);
        assert_eq!(goal.due_date, 15);
        assert_eq!(goal.alert_percentage, 80);
    }
}
