// 🏠 Application State - the single owner of every collection
//
// AppState holds the transaction store, the category registry, the learned
// table, the goal and the assistant history, plus the injected
// collaborators (persistence, notices, optional text service). Engines are
// called with the data they need; nothing reaches for ambient state.
//
// Mutations follow one shape:
//   1. validate (abort before touching anything)
//   2. apply in memory
//   3. persist (failures are logged + noticed, never rolled back)
//   4. publish a change event

use crate::assistant::{
    build_context, build_prompt, expense_added_reply, local_answer, push_history, AiInteraction,
    LocalIntent, TextService,
};
use crate::config::{keys, FeatureFlags, Settings, APP_NAME};
use crate::db::{Source, Transaction, TransactionInput, TransactionPatch, TransactionStatus};
use crate::deduplication::{
    AutoResolveRules, DeduplicationEngine, DuplicateGroup, DuplicateStats, MatchStrategy,
};
use crate::entities::{Category, CategoryRegistry, CategoryUsage, PredefinedSet};
use crate::error::{FinanceError, FinanceResult};
use crate::events::{Event, EventBus, Notifier, Severity};
use crate::goals::{AlertTracker, GoalAlert, GoalProgress, MonthlyGoal};
use crate::rules::{ClassificationResult, LearnedTable, RuleEngine};
use crate::schema::SchemaValidator;
use crate::statistics::{self, Statistics};
use crate::storage::{load_typed, KeyValueStore};
use crate::temporal::{day_key, normalize_date};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::Receiver;

const EMPTY_QUESTION_REPLY: &str = "Por favor, faça uma pergunta.";

// ============================================================================
// QUERY & REPORT TYPES
// ============================================================================

/// Field filter for `AppState::find`; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub category: Option<String>,
    pub method: Option<String>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        TransactionFilter::default()
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        let field_matches = |wanted: &Option<String>, actual: &Option<String>| match wanted {
            Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
            None => true,
        };

        field_matches(&self.category, &tx.category)
            && field_matches(&self.method, &tx.method)
            && self.status.map_or(true, |status| tx.status == status)
    }
}

/// Outcome of a batch import: what went in, and which rows were refused
#[derive(Debug, Default)]
pub struct ImportReport {
    pub added: Vec<Transaction>,
    /// (position in the batch, reason)
    pub failures: Vec<(usize, FinanceError)>,
}

/// Backup document. On import, absent sections leave current data alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_categories: Option<LearnedTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_goals: Option<MonthlyGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<FeatureFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: String,
}

// ============================================================================
// APP STATE
// ============================================================================

pub struct AppState {
    settings: Settings,
    flags: FeatureFlags,
    validator: SchemaValidator,
    rules: RuleEngine,
    dedup: DeduplicationEngine,
    categories: CategoryRegistry,
    transactions: Vec<Transaction>,
    goal: MonthlyGoal,
    alerts: AlertTracker,
    history: Vec<AiInteraction>,
    store: Box<dyn KeyValueStore>,
    notifier: Option<Box<dyn Notifier>>,
    text_service: Option<Box<dyn TextService>>,
    events: EventBus,
    /// Fixed calendar day (tests); None = local today
    today: Option<NaiveDate>,
}

impl AppState {
    /// Fresh state with default tables. Nothing is read from `store`.
    pub fn new(settings: Settings, store: Box<dyn KeyValueStore>) -> Self {
        AppState {
            flags: FeatureFlags::default(),
            validator: SchemaValidator::new(settings.validation.clone()),
            rules: RuleEngine::with_defaults(),
            dedup: DeduplicationEngine::from_settings(&settings.duplicates),
            categories: CategoryRegistry::with_defaults(),
            transactions: Vec::new(),
            goal: MonthlyGoal::default(),
            alerts: AlertTracker::new(),
            history: Vec::new(),
            store,
            notifier: None,
            text_service: None,
            events: EventBus::new(),
            today: None,
            settings,
        }
    }

    /// Build state from whatever `store` already holds
    pub fn load(settings: Settings, store: Box<dyn KeyValueStore>) -> FinanceResult<Self> {
        let mut app = AppState::new(settings, store);
        app.reload()?;
        Ok(app)
    }

    /// Builder pattern: user-facing notices
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Builder pattern: remote assistant. Without one, only local answers.
    pub fn with_text_service(mut self, service: Box<dyn TextService>) -> Self {
        self.text_service = Some(service);
        self
    }

    /// Builder pattern: replace the static pattern table
    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        let learned = self.rules.learned().clone();
        self.rules = rules;
        self.rules.set_learned(learned);
        self
    }

    /// Builder pattern: pin "today" (month filters, goal projection)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Re-read every key; missing keys keep the current values
    pub fn reload(&mut self) -> FinanceResult<()> {
        let store = &*self.store;

        if let Some(transactions) = load_typed::<Vec<Transaction>>(store, keys::TRANSACTIONS)? {
            self.validator
                .validate_ids(&transactions)
                .map_err(FinanceError::Validation)?;
            self.transactions = transactions;
        }
        if let Some(categories) = load_typed::<Vec<Category>>(store, keys::CATEGORIES)? {
            if !categories.is_empty() {
                self.categories = CategoryRegistry::from_categories(categories);
            }
        }
        if let Some(learned) = load_typed::<LearnedTable>(store, keys::LEARNED_CATEGORIES)? {
            self.rules.set_learned(learned);
        }
        if let Some(goal) = load_typed::<MonthlyGoal>(store, keys::MONTHLY_GOALS)? {
            self.goal = goal;
        }
        if let Some(history) = load_typed::<Vec<AiInteraction>>(store, keys::AI_HISTORY)? {
            self.history = history;
        }
        if let Some(flags) = load_typed::<FeatureFlags>(store, keys::SETTINGS)? {
            self.flags = flags;
        }

        tracing::info!(
            transactions = self.transactions.len(),
            categories = self.categories.count(),
            learned = self.rules.learned().len(),
            "state loaded"
        );
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    pub fn categories(&self) -> &[Category] {
        self.categories.all()
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn goal(&self) -> &MonthlyGoal {
        &self.goal
    }

    pub fn history(&self) -> &[AiInteraction] {
        &self.history
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn has_text_service(&self) -> bool {
        self.text_service.is_some()
    }

    pub fn subscribe(&mut self) -> Receiver<Event> {
        self.events.subscribe()
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn set_flags(&mut self, flags: FeatureFlags) {
        self.flags = flags;
        self.persist(keys::SETTINGS);
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Validate, categorize, flag possible duplicates, store.
    ///
    /// Returns the stored record. When insert-time auto-resolution removes
    /// the new record as the older copy of an exact duplicate, the surviving
    /// original is returned instead.
    pub fn add_transaction(&mut self, input: TransactionInput) -> FinanceResult<Transaction> {
        if let Err(errors) = self.validator.validate_input(&input) {
            let err = FinanceError::Validation(errors);
            self.notify(&err.to_string(), Severity::Error);
            return Err(err);
        }

        let mut tx = Transaction::from_input(input, Utc::now());
        if self.flags.smart_categorization {
            tx = self.rules.categorize(tx);
        }

        let run_auto_resolve = self.flag_possible_duplicate(&mut tx);

        self.transactions.push(tx.clone());
        tracing::info!(id = %tx.id, name = %tx.name, amount = tx.amount, "transaction added");

        self.events.publish(Event::TransactionAdded { id: tx.id.clone() });
        if let (Some(duplicate_of), Some(confidence)) = (&tx.duplicate_of, tx.duplicate_confidence) {
            self.events.publish(Event::DuplicateFlagged {
                id: tx.id.clone(),
                duplicate_of: duplicate_of.clone(),
                confidence,
            });
        }

        if run_auto_resolve {
            let rules = AutoResolveRules::default()
                .with_min_confidence(self.settings.duplicates.auto_resolve_threshold);
            self.auto_resolve(&rules);
        }

        self.persist(keys::TRANSACTIONS);

        if self.get(&tx.id).is_some() {
            self.notify("Transação adicionada com sucesso!", Severity::Success);
            self.check_alerts();
            return Ok(tx);
        }

        // Resolved away as the older copy of an exact duplicate
        tracing::info!(id = %tx.id, "new transaction resolved into its original");
        self.events.publish(Event::TransactionDeleted { id: tx.id.clone() });
        self.check_alerts();
        tx.duplicate_of
            .as_deref()
            .and_then(|id| self.get(id))
            .cloned()
            .ok_or_else(|| FinanceError::NotFound(format!("transaction {}", tx.id)))
    }

    /// Strict comparison against the current store. Returns whether
    /// insert-time auto-resolution should run.
    fn flag_possible_duplicate(&mut self, tx: &mut Transaction) -> bool {
        if !self.flags.auto_detect_duplicates {
            return false;
        }

        let strict = self.dedup.clone().with_strategy(MatchStrategy::Strict);
        let similar = strict.find_similar(tx, &self.transactions);
        let Some(first) = similar.first() else {
            return false;
        };

        let confidence = strict.confidence(tx, &similar);
        let thresholds = &self.settings.duplicates;
        if confidence < thresholds.flag_threshold {
            return false;
        }

        tx.is_possible_duplicate = true;
        tx.duplicate_of = Some(first.id.clone());
        tx.duplicate_confidence = Some(confidence);
        tracing::debug!(id = %tx.id, duplicate_of = %first.id, confidence, "possible duplicate flagged");

        let auto = confidence >= thresholds.auto_resolve_threshold && self.flags.auto_resolve_duplicates;

        self.notify(
            &format!(
                "Possível duplicata detectada: {} ({}% de confiança)",
                tx.name, confidence
            ),
            Severity::Warning,
        );

        auto
    }

    pub fn update_transaction(&mut self, id: &str, patch: &TransactionPatch) -> FinanceResult<Transaction> {
        let Some(index) = self.transactions.iter().position(|t| t.id == id) else {
            return Err(self.not_found(id));
        };

        let mut next = patch.apply(&self.transactions[index]);
        if let Err(errors) = self.validator.validate_transaction(&next) {
            let err = FinanceError::Validation(errors);
            self.notify(&err.to_string(), Severity::Error);
            return Err(err);
        }

        next.updated_at = Utc::now();
        self.transactions[index] = next.clone();

        self.persist(keys::TRANSACTIONS);
        self.events.publish(Event::TransactionUpdated { id: id.to_string() });
        self.notify("Transação atualizada com sucesso!", Severity::Success);
        Ok(next)
    }

    /// Hard removal
    pub fn delete_transaction(&mut self, id: &str) -> FinanceResult<Transaction> {
        let removed = self.remove_record(id)?;
        self.notify("Transação removida com sucesso!", Severity::Success);
        Ok(removed)
    }

    /// Remove, persist, publish. The caller sends the notice.
    fn remove_record(&mut self, id: &str) -> FinanceResult<Transaction> {
        let Some(index) = self.transactions.iter().position(|t| t.id == id) else {
            return Err(self.not_found(id));
        };

        let removed = self.transactions.remove(index);
        tracing::info!(id, "transaction deleted");
        self.clear_dangling_flags();

        self.persist(keys::TRANSACTIONS);
        self.events.publish(Event::TransactionDeleted { id: id.to_string() });
        Ok(removed)
    }

    /// Automatic flags pointing at records that no longer exist are cleared
    fn clear_dangling_flags(&mut self) -> usize {
        let ids: HashSet<String> = self.transactions.iter().map(|t| t.id.clone()).collect();

        let mut cleared = 0;
        for tx in self.transactions.iter_mut().filter(|t| t.is_possible_duplicate) {
            if tx.duplicate_of.as_ref().map_or(true, |id| !ids.contains(id)) {
                tx.clear_possible_duplicate();
                cleared += 1;
            }
        }
        if cleared > 0 {
            tracing::debug!(cleared, "dangling duplicate flags cleared");
        }
        cleared
    }

    pub fn find(&self, filter: &TransactionFilter) -> Vec<&Transaction> {
        self.transactions.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn transactions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Transaction> {
        statistics::transactions_between(&self.transactions, start, end)
    }

    pub fn recent(&self, limit: usize) -> Vec<&Transaction> {
        statistics::recent(&self.transactions, limit)
    }

    /// Every record goes through `add_transaction`; one bad row does not
    /// stop the batch.
    pub fn import_transactions(&mut self, inputs: Vec<TransactionInput>, source: Source) -> ImportReport {
        let mut report = ImportReport::default();

        for (position, input) in inputs.into_iter().enumerate() {
            match self.add_transaction(input.with_source(source)) {
                Ok(tx) => report.added.push(tx),
                Err(err) => {
                    tracing::warn!(position, error = %err, "import row rejected");
                    report.failures.push((position, err));
                }
            }
        }

        tracing::info!(
            added = report.added.len(),
            failed = report.failures.len(),
            "import finished"
        );
        self.events.publish(Event::DataImported {
            transactions: report.added.len(),
        });
        report
    }

    // ========================================================================
    // CATEGORIES & LEARNING
    // ========================================================================

    /// Learn a name -> category correction and rewrite matching records
    pub fn learn(&mut self, name: &str, category: &str, subcategory: Option<&str>) -> usize {
        let rewritten = self
            .rules
            .learn(name, category, subcategory, &mut self.transactions, Utc::now());

        self.persist(keys::LEARNED_CATEGORIES);
        if rewritten > 0 {
            self.persist(keys::TRANSACTIONS);
        }
        self.events.publish(Event::CategoryLearned {
            name: name.trim().to_string(),
            category: category.trim().to_string(),
        });
        self.notify(
            &format!("Categoria aprendida para \"{}\"", name.trim()),
            Severity::Success,
        );
        rewritten
    }

    pub fn suggest_category(&self, name: &str) -> Option<ClassificationResult> {
        self.rules.suggest(name)
    }

    pub fn add_category(&mut self, name: &str, subcategories: Vec<String>) -> FinanceResult<()> {
        let result = self.categories.add(name, subcategories).map(|_| ());
        self.after_category_change(result, keys::CATEGORIES)
    }

    /// Rename and/or replace subcategories; transactions and learned
    /// patterns follow the rename. Returns how many transactions changed.
    pub fn update_category(
        &mut self,
        old_name: &str,
        new_name: &str,
        subcategories: Vec<String>,
    ) -> FinanceResult<usize> {
        let result = self
            .categories
            .update(old_name, new_name, subcategories, &mut self.transactions);
        if result.is_ok() {
            self.rules.rename_category(old_name, new_name.trim());
            self.persist(keys::LEARNED_CATEGORIES);
        }
        self.after_category_change(result, keys::TRANSACTIONS)
    }

    /// Remove a category; its transactions become uncategorized and learned
    /// patterns pointing at it are dropped
    pub fn delete_category(&mut self, name: &str) -> FinanceResult<usize> {
        let result = self.categories.delete(name, &mut self.transactions);
        if result.is_ok() {
            let forgotten = self.rules.forget_category(name);
            tracing::debug!(category = name, forgotten, "learned patterns dropped");
            self.persist(keys::LEARNED_CATEGORIES);
        }
        self.after_category_change(result, keys::TRANSACTIONS)
    }

    pub fn add_subcategory(&mut self, category: &str, subcategory: &str) -> FinanceResult<()> {
        let result = self.categories.add_subcategory(category, subcategory);
        self.after_category_change(result, keys::CATEGORIES)
    }

    pub fn remove_subcategory(&mut self, category: &str, subcategory: &str) -> FinanceResult<usize> {
        let result = self
            .categories
            .remove_subcategory(category, subcategory, &mut self.transactions);
        self.after_category_change(result, keys::TRANSACTIONS)
    }

    pub fn category_usage(&self) -> BTreeMap<String, CategoryUsage> {
        self.categories.usage_stats(&self.transactions)
    }

    /// "default" | "business" | "personal". Returns how many were added.
    pub fn import_predefined_categories(&mut self, set_name: &str) -> FinanceResult<usize> {
        let set = match set_name.parse::<PredefinedSet>() {
            Ok(set) => set,
            Err(err) => {
                self.notify("Conjunto de categorias não encontrado", Severity::Error);
                return Err(err);
            }
        };

        let added = self.categories.import_predefined(set);
        self.after_category_change(Ok(added), keys::CATEGORIES)
    }

    /// Shared tail of every registry mutation: notice on failure; persist
    /// and publish on success
    fn after_category_change<T>(&mut self, result: FinanceResult<T>, extra_key: &str) -> FinanceResult<T> {
        match result {
            Ok(value) => {
                self.persist(keys::CATEGORIES);
                if extra_key != keys::CATEGORIES {
                    self.persist(extra_key);
                }
                self.events.publish(Event::CategoriesChanged);
                Ok(value)
            }
            Err(err) => {
                self.notify(&err.to_string(), Severity::Error);
                Err(err)
            }
        }
    }

    // ========================================================================
    // DUPLICATES
    // ========================================================================

    pub fn find_all_duplicates(&self) -> Vec<DuplicateGroup> {
        self.dedup.find_all_duplicates(&self.transactions)
    }

    /// Sweep with an explicit strategy (strict or fuzzy)
    pub fn find_duplicates_with(&self, strategy: MatchStrategy) -> Vec<DuplicateGroup> {
        self.dedup
            .clone()
            .with_strategy(strategy)
            .find_all_duplicates(&self.transactions)
    }

    pub fn duplicate_stats(&self) -> DuplicateStats {
        self.dedup.stats(&self.transactions)
    }

    /// Annotate `id` as a confirmed duplicate of `original_id`. Nothing is
    /// deleted. False when `id` does not exist.
    pub fn mark_as_duplicate(&mut self, id: &str, original_id: &str) -> bool {
        let Some(tx) = self.transactions.iter_mut().find(|t| t.id == id) else {
            return false;
        };

        tx.is_duplicate = true;
        tx.duplicate_of = Some(original_id.to_string());
        tx.duplicate_marked_at = Some(Utc::now());

        self.persist(keys::TRANSACTIONS);
        self.events.publish(Event::TransactionUpdated { id: id.to_string() });
        true
    }

    pub fn unmark_as_duplicate(&mut self, id: &str) -> bool {
        let Some(tx) = self.transactions.iter_mut().find(|t| t.id == id) else {
            return false;
        };

        tx.is_duplicate = false;
        tx.duplicate_marked_at = None;
        tx.clear_possible_duplicate();

        self.persist(keys::TRANSACTIONS);
        self.events.publish(Event::TransactionUpdated { id: id.to_string() });
        true
    }

    pub fn remove_duplicate(&mut self, id: &str) -> bool {
        if self.remove_record(id).is_err() {
            return false;
        }
        self.notify("Duplicata removida com sucesso!", Severity::Success);
        true
    }

    /// Delete every duplicate of every group, keeping the group originals
    pub fn remove_all_duplicates(&mut self) -> usize {
        let doomed: Vec<String> = self
            .find_all_duplicates()
            .iter()
            .flat_map(|g| g.duplicates.iter().map(|d| d.id.clone()))
            .collect();

        let before = self.transactions.len();
        self.transactions.retain(|t| !doomed.contains(&t.id));
        let removed = before - self.transactions.len();

        self.after_duplicates_removed(removed);
        self.notify(&format!("{} duplicatas removidas!", removed), Severity::Success);
        removed
    }

    /// Delete exact duplicates per `rules`. Irreversible.
    pub fn auto_resolve(&mut self, rules: &AutoResolveRules) -> usize {
        let removed = self.dedup.auto_resolve(&mut self.transactions, rules);
        self.after_duplicates_removed(removed);
        if removed > 0 {
            self.notify(
                &format!("{} duplicatas resolvidas automaticamente", removed),
                Severity::Info,
            );
        }
        removed
    }

    fn after_duplicates_removed(&mut self, removed: usize) {
        if removed == 0 {
            return;
        }
        self.clear_dangling_flags();
        self.persist(keys::TRANSACTIONS);
        self.events.publish(Event::DuplicatesResolved { removed });
    }

    // ========================================================================
    // GOALS & STATISTICS
    // ========================================================================

    pub fn save_goal(&mut self, goal: MonthlyGoal) -> FinanceResult<()> {
        if let Err(errors) = self.validator.validate_goal(&goal) {
            let err = FinanceError::Validation(errors);
            self.notify(&err.to_string(), Severity::Error);
            return Err(err);
        }

        self.goal = goal;
        self.persist(keys::MONTHLY_GOALS);
        self.events.publish(Event::GoalChanged);
        self.notify("Meta salva com sucesso!", Severity::Success);
        self.check_alerts();
        Ok(())
    }

    /// Back to (0, 15, 20, 80)
    pub fn reset_goal(&mut self) {
        self.goal = MonthlyGoal::default();
        self.alerts.reset();
        self.persist(keys::MONTHLY_GOALS);
        self.events.publish(Event::GoalChanged);
    }

    pub fn goal_progress(&self) -> GoalProgress {
        GoalProgress::compute(&self.transactions, &self.goal, self.today())
    }

    /// Recompute progress and notify the first time a threshold is crossed
    /// this session
    pub fn check_alerts(&mut self) -> Option<GoalAlert> {
        let progress = self.goal_progress();
        let alert = self.alerts.check(&progress, &self.goal)?;

        tracing::info!(month = %alert.month, progress = alert.progress, level = ?alert.level, "goal alert");
        self.notify(&alert.message, alert.level.severity());
        Some(alert)
    }

    /// Start a new alert session (the day rolled over)
    pub fn reset_alerts(&mut self) {
        self.alerts.reset();
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::compute(&self.transactions)
    }

    pub fn daily_average(&self) -> f64 {
        statistics::daily_average(&self.transactions, self.today())
    }

    pub fn insights(&self) -> Vec<statistics::Insight> {
        statistics::spending_insights(&self.transactions)
    }

    pub fn suggestions(&self) -> Vec<statistics::Suggestion> {
        statistics::suggestions(&self.transactions, self.goal_progress().progress)
    }

    // ========================================================================
    // ASSISTANT
    // ========================================================================

    /// Answer a question. The remote service is tried first when present;
    /// any failure falls back to the local keyword rules.
    pub async fn ask(&mut self, question: &str) -> String {
        let question = question.trim();
        if question.is_empty() {
            return EMPTY_QUESTION_REPLY.to_string();
        }

        let today = self.today();
        if let Some(service) = &self.text_service {
            let context = build_context(&self.transactions, &self.goal, self.categories.all(), today);
            let prompt = build_prompt(APP_NAME, &context, question);

            let reply = service.ask(&prompt).await;
            match reply {
                Ok(answer) => {
                    push_history(
                        &mut self.history,
                        AiInteraction::new(question, &answer, Utc::now()),
                        self.settings.ai.max_history,
                    );
                    self.persist(keys::AI_HISTORY);
                    return answer;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "assistant service failed, answering locally");
                }
            }
        }

        self.answer_locally(question, today)
    }

    fn answer_locally(&mut self, question: &str, today: NaiveDate) -> String {
        match local_answer(question, &self.transactions, &self.goal, today) {
            LocalIntent::Answer(text) => text,
            LocalIntent::AddExpense {
                amount,
                place,
                category,
            } => {
                let input = TransactionInput::new(&place, amount, &day_key(today))
                    .with_category(&category, None)
                    .with_source(Source::AiChat);

                match self.add_transaction(input) {
                    Ok(tx) => expense_added_reply(
                        tx.amount,
                        &tx.name,
                        tx.category.as_deref().unwrap_or(&category),
                    ),
                    Err(err) => format!("Não foi possível adicionar a transação: {}", err),
                }
            }
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.persist(keys::AI_HISTORY);
        self.notify("Histórico da IA limpo", Severity::Success);
    }

    // ========================================================================
    // BACKUP & LIFECYCLE
    // ========================================================================

    pub fn export_data(&self) -> Snapshot {
        Snapshot {
            transactions: Some(self.transactions.clone()),
            categories: Some(self.categories.all().to_vec()),
            learned_categories: Some(self.rules.learned().clone()),
            monthly_goals: Some(self.goal.clone()),
            settings: Some(self.flags.clone()),
            exported_at: Some(Utc::now()),
            version: crate::VERSION.to_string(),
        }
    }

    /// Replace the sections present in `snapshot`, then save everything
    pub fn import_data(&mut self, snapshot: Snapshot) -> FinanceResult<()> {
        if let Some(transactions) = &snapshot.transactions {
            let invalid: Vec<_> = transactions
                .iter()
                .filter_map(|t| self.validator.validate_transaction(t).err())
                .flatten()
                .collect();
            if !invalid.is_empty() {
                let err = FinanceError::Validation(invalid);
                self.notify("Erro ao importar dados", Severity::Error);
                return Err(err);
            }
            if let Err(errors) = self.validator.validate_ids(transactions) {
                self.notify("Erro ao importar dados", Severity::Error);
                return Err(FinanceError::Validation(errors));
            }
        }
        if let Some(goal) = &snapshot.monthly_goals {
            if let Err(errors) = self.validator.validate_goal(goal) {
                self.notify("Erro ao importar dados", Severity::Error);
                return Err(FinanceError::Validation(errors));
            }
        }

        if let Some(transactions) = snapshot.transactions {
            self.transactions = transactions
                .into_iter()
                .map(|mut tx| {
                    tx.date = normalize_date(&tx.date);
                    tx
                })
                .collect();
        }
        if let Some(categories) = snapshot.categories {
            self.categories = CategoryRegistry::from_categories(categories);
        }
        if let Some(learned) = snapshot.learned_categories {
            self.rules.set_learned(learned);
        }
        if let Some(goal) = snapshot.monthly_goals {
            self.goal = goal;
        }
        if let Some(flags) = snapshot.settings {
            self.flags = flags;
        }

        if !self.save_all() {
            return Err(FinanceError::Storage(
                "Falha ao salvar dados importados".to_string(),
            ));
        }

        self.events.publish(Event::DataImported {
            transactions: self.transactions.len(),
        });
        self.notify("Dados importados com sucesso!", Severity::Success);
        Ok(())
    }

    /// Drop every stored key and return to defaults
    pub fn clear_all(&mut self) {
        for key in keys::ALL {
            if let Err(err) = self.store.remove(key) {
                tracing::error!(key, error = %err, "failed to remove key");
            }
        }

        self.transactions.clear();
        self.categories = CategoryRegistry::with_defaults();
        self.rules.set_learned(LearnedTable::new());
        self.goal = MonthlyGoal::default();
        self.history.clear();
        self.flags = FeatureFlags::default();
        self.alerts.reset();

        tracing::info!("all data cleared");
        self.events.publish(Event::DataCleared);
    }

    /// Write every key; false if any write failed
    pub fn save_all(&mut self) -> bool {
        keys::ALL
            .iter()
            .fold(true, |ok, key| self.persist(key) && ok)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn document(&self, key: &str) -> FinanceResult<Value> {
        let value = match key {
            keys::TRANSACTIONS => serde_json::to_value(&self.transactions)?,
            keys::CATEGORIES => serde_json::to_value(self.categories.all())?,
            keys::LEARNED_CATEGORIES => serde_json::to_value(self.rules.learned())?,
            keys::MONTHLY_GOALS => serde_json::to_value(&self.goal)?,
            keys::AI_HISTORY => serde_json::to_value(&self.history)?,
            keys::SETTINGS => serde_json::to_value(&self.flags)?,
            other => return Err(FinanceError::NotFound(format!("storage key {}", other))),
        };
        Ok(value)
    }

    /// Save one key. Failures are reported; memory stays authoritative.
    fn persist(&mut self, key: &str) -> bool {
        let result = self
            .document(key)
            .and_then(|value| self.store.save(key, &value));

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(key, error = %err, "failed to persist");
                self.notify("Erro ao salvar dados", Severity::Error);
                false
            }
        }
    }

    fn not_found(&self, id: &str) -> FinanceError {
        self.notify("Transação não encontrada", Severity::Error);
        FinanceError::NotFound(format!("transaction {}", id))
    }

    /// Success/info notices respect the notifications preference; warnings
    /// and errors always go out
    fn notify(&self, message: &str, severity: Severity) {
        if !self.flags.notifications && matches!(severity, Severity::Success | Severity::Info) {
            return;
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(message, severity, severity.default_duration());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
