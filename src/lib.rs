// Konomiza - Core Library
// Exposes all modules for use in the CLI and tests

pub mod app;           // Application root: owns every collection
pub mod assistant;     // Financial assistant (remote service + local fallback)
pub mod config;        // Settings, feature flags, storage keys
pub mod db;            // Transaction model
pub mod deduplication; // Duplicate detection engine
pub mod entities;      // Category registry
pub mod error;
pub mod events;        // Notices + change events
pub mod format;
pub mod fuzzy;         // Edit-distance similarity
pub mod goals;         // Monthly goal projection + alerts
pub mod parser;        // CSV import, monetary parsing
pub mod rules;         // Categorization engine
pub mod schema;        // Validation
pub mod statistics;
pub mod storage;       // Key-value persistence
pub mod temporal;      // Date parsing, windows, month keys

// Re-export commonly used types
pub use app::{AppState, ImportReport, Snapshot, TransactionFilter};
pub use assistant::{local_answer, AiInteraction, LocalIntent, TextService};
#[cfg(feature = "gemini")]
pub use assistant::GeminiClient;
pub use config::{FeatureFlags, Settings};
pub use db::{Source, Transaction, TransactionInput, TransactionPatch, TransactionStatus};
pub use deduplication::{
    AutoResolveRules, DeduplicationEngine, DuplicateGroup, DuplicateStats, MatchStrategy,
};
pub use entities::{Category, CategoryRegistry, PredefinedSet};
pub use error::{FinanceError, FinanceResult};
pub use events::{Event, EventBus, Notifier, Severity, TracingNotifier};
pub use goals::{AlertTracker, GoalAlert, GoalProgress, GoalStatus, MonthlyGoal};
pub use parser::{detect_payment_method, load_csv, parse_monetary_value};
pub use rules::{ClassificationResult, RuleEngine};
pub use schema::{SchemaValidator, ValidationError};
pub use statistics::Statistics;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
