// 🗄️ Key-Value Persistence
// Whole collections are saved as JSON documents under fixed keys (see
// config::keys). SQLite backs the CLI; MemoryStore backs tests and
// throwaway sessions.

use crate::error::FinanceResult;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub trait KeyValueStore: Send {
    fn save(&mut self, key: &str, value: &Value) -> FinanceResult<()>;

    /// None when the key was never written
    fn load(&self, key: &str) -> FinanceResult<Option<Value>>;

    fn remove(&mut self, key: &str) -> FinanceResult<()>;
}

/// Load and deserialize a key. A missing key is Ok(None); a malformed
/// document is an error.
pub fn load_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> FinanceResult<Option<T>> {
    match store.load(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

// ============================================================================
// SQLITE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> FinanceResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn in_memory() -> FinanceResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn keys(&self) -> FinanceResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

/// Create the kv table; WAL for crash recovery
pub fn setup_database(conn: &Connection) -> FinanceResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn save(&mut self, key: &str, value: &Value) -> FinanceResult<()> {
        let document = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, document, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(key, bytes = document.len(), "saved");
        Ok(())
    }

    fn load(&self, key: &str) -> FinanceResult<Option<Value>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match document {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn remove(&mut self, key: &str) -> FinanceResult<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&mut self, key: &str, value: &Value) -> FinanceResult<()> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> FinanceResult<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove(&mut self, key: &str) -> FinanceResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::MonthlyGoal;
    use serde_json::json;

    fn exercise(store: &mut dyn KeyValueStore) {
        assert!(store.load("missing").unwrap().is_none());

        store.save("k", &json!({ "a": 1 })).unwrap();
        store.save("k", &json!([1, 2, 3])).unwrap();
        assert_eq!(store.load("k").unwrap(), Some(json!([1, 2, 3])));

        store.remove("k").unwrap();
        assert!(store.load("k").unwrap().is_none());
        // Removing twice is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        exercise(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sqlite_in_memory() {
        let mut store = SqliteStore::in_memory().unwrap();
        exercise(&mut store);
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("konomiza.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            let goal = MonthlyGoal::new(1500.0, 10, 25, 90);
            store
                .save("konomiza-monthly-goals", &serde_json::to_value(&goal).unwrap())
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let goal: MonthlyGoal = load_typed(&store, "konomiza-monthly-goals")
            .unwrap()
            .unwrap();
        assert_eq!(goal.goal, 1500.0);
        assert_eq!(goal.alert_percentage, 90);
        assert_eq!(store.keys().unwrap(), vec!["konomiza-monthly-goals"]);
    }

    #[test]
    fn test_load_typed_reports_malformed_documents() {
        let mut store = MemoryStore::new();
        store.save("goal", &json!({ "goal": "lots" })).unwrap();

        let result: FinanceResult<Option<MonthlyGoal>> = load_typed(&store, "goal");
        assert!(result.is_err());
    }
}
