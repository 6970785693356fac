// ⚙️ Configuration
// Static settings (validation bounds, thresholds, assistant endpoint) come from
// an optional JSON file plus environment overrides. User preferences that the
// app itself toggles (FeatureFlags) are persisted in the key-value store.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const APP_NAME: &str = "Konomiza";

/// Storage keys for the key-value store
pub mod keys {
    pub const TRANSACTIONS: &str = "konomiza-transactions";
    pub const CATEGORIES: &str = "konomiza-categories";
    pub const LEARNED_CATEGORIES: &str = "konomiza-learned-categories";
    pub const MONTHLY_GOALS: &str = "konomiza-monthly-goals";
    pub const AI_HISTORY: &str = "konomiza-ai-history";
    pub const SETTINGS: &str = "konomiza-settings";

    pub const ALL: [&str; 6] = [
        TRANSACTIONS,
        CATEGORIES,
        LEARNED_CATEGORIES,
        MONTHLY_GOALS,
        AI_HISTORY,
        SETTINGS,
    ];
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub validation: ValidationLimits,
    pub duplicates: DuplicateSettings,
    pub ai: AiSettings,
    /// SQLite file backing the key-value store
    pub storage_path: String,
    /// tracing EnvFilter directive for the binary
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            validation: ValidationLimits::default(),
            duplicates: DuplicateSettings::default(),
            ai: AiSettings::default(),
            storage_path: "konomiza.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        let settings: Settings =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        Ok(settings)
    }

    /// Apply KONOMIZA_* environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("KONOMIZA_GEMINI_API_KEY").filter(|k| !k.is_empty()) {
            self.ai.api_key = Some(key);
        }
        if let Some(path) = lookup("KONOMIZA_DB").filter(|p| !p.is_empty()) {
            self.storage_path = path;
        }
        if let Some(level) = lookup("KONOMIZA_LOG").filter(|l| !l.is_empty()) {
            self.log_level = level;
        }
        self
    }
}

/// Bounds enforced by the schema validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub min_amount: f64,
    pub max_amount: f64,
    pub min_goal: f64,
    pub max_goal: f64,
    pub min_day: u32,
    pub max_day: u32,
    pub min_percentage: u32,
    pub max_percentage: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        ValidationLimits {
            min_amount: 0.01,
            max_amount: 999_999.99,
            min_goal: 0.0,
            max_goal: 9_999_999.0,
            min_day: 1,
            max_day: 31,
            min_percentage: 0,
            max_percentage: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
    /// Confidence at or above which a newly inserted record is flagged
    pub flag_threshold: u8,
    /// Confidence at or above which insert-time auto-resolution runs
    pub auto_resolve_threshold: u8,
    /// Minimum name similarity for the fuzzy strategy
    pub fuzzy_name_threshold: f64,
}

impl Default for DuplicateSettings {
    fn default() -> Self {
        DuplicateSettings {
            flag_threshold: 70,
            auto_resolve_threshold: 90,
            fuzzy_name_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Interactions kept in the assistant history
    pub max_history: usize,
}

impl Default for AiSettings {
    fn default() -> Self {
        AiSettings {
            api_key: None,
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.7,
            max_output_tokens: 800,
            max_history: 20,
        }
    }
}

// ============================================================================
// FEATURE FLAGS (persisted user preferences)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureFlags {
    pub auto_detect_duplicates: bool,
    pub smart_categorization: bool,
    pub auto_resolve_duplicates: bool,
    pub notifications: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            auto_detect_duplicates: true,
            smart_categorization: true,
            auto_resolve_duplicates: false,
            notifications: true,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.validation.min_amount, 0.01);
        assert_eq!(settings.validation.max_amount, 999_999.99);
        assert_eq!(settings.duplicates.flag_threshold, 70);
        assert_eq!(settings.ai.max_history, 20);
        assert!(settings.ai.api_key.is_none());
    }

    #[test]
    fn test_from_file_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "storage_path": "/tmp/k.db", "duplicates": {{ "flag_threshold": 80 }} }}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.storage_path, "/tmp/k.db");
        assert_eq!(settings.duplicates.flag_threshold, 80);
        // Untouched nested keys keep defaults
        assert_eq!(settings.duplicates.auto_resolve_threshold, 90);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Settings::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read settings file"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("KONOMIZA_GEMINI_API_KEY", "secret"),
            ("KONOMIZA_DB", "other.db"),
            ("KONOMIZA_LOG", ""),
        ]
        .into_iter()
        .collect();

        let settings =
            Settings::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.ai.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.storage_path, "other.db");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_feature_flags_camel_case() {
        let flags: FeatureFlags =
            serde_json::from_str(r#"{ "autoResolveDuplicates": true }"#).unwrap();
        assert!(flags.auto_resolve_duplicates);
        assert!(flags.auto_detect_duplicates);
    }
}
