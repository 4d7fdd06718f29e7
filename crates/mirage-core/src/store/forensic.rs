//! SQLite persistence for forensic engagement records.
//!
//! One append-only table; records are inserted once and optionally updated
//! exactly once to attach an evidence reference. Nothing is ever deleted by
//! the pipeline.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::event::Severity;

/// Category value for records written on a firewall block.
pub const CATEGORY_BLOCKED: &str = "Blocked / Rule Hit";

/// Category value for records written after a deception engagement.
pub const CATEGORY_DECEPTION: &str = "SQL Injection / RCE";

/// One forensic record, mirroring the attack event fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRow {
    /// Database id; 0 until the row is inserted.
    #[serde(default)]
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub category: String,
    pub severity: Severity,
    pub command: String,
    pub response: String,
    /// Wall-clock seconds from receipt to response completion.
    pub engagement_secs: f64,
    #[serde(default)]
    pub evidence_path: Option<String>,
}

/// Durable, queryable store of every engagement.
pub struct ForensicStore {
    conn: Mutex<Connection>,
}

impl ForensicStore {
    /// Open or create the forensic database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory for {}", db_path.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening forensic database at {}", db_path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().unwrap().execute_batch(
            "CREATE TABLE IF NOT EXISTS engagements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                occurred_at TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                command TEXT NOT NULL,
                response TEXT NOT NULL,
                engagement_secs REAL NOT NULL,
                evidence_path TEXT
            );",
        )?;
        Ok(())
    }

    /// Insert a new record, returning its id.
    pub fn insert(&self, row: &EngagementRow) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO engagements
                (occurred_at, category, severity, command, response, engagement_secs, evidence_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.occurred_at.to_rfc3339(),
                row.category,
                row.severity.as_str(),
                row.command,
                row.response,
                row.engagement_secs,
                row.evidence_path,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Attach an evidence reference to an existing record.
    pub fn attach_evidence(&self, id: i64, reference: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE engagements SET evidence_path = ?1 WHERE id = ?2",
            rusqlite::params![reference, id],
        )?;
        anyhow::ensure!(updated == 1, "no engagement record with id {id}");
        Ok(())
    }

    /// All records, newest first, optionally capped.
    pub fn recent(&self, limit: Option<usize>) -> Result<Vec<EngagementRow>> {
        let conn = self.conn.lock().unwrap();
        let sql = match limit {
            Some(n) => format!(
                "SELECT id, occurred_at, category, severity, command, response,
                        engagement_secs, evidence_path
                 FROM engagements ORDER BY id DESC LIMIT {n}"
            ),
            None => "SELECT id, occurred_at, category, severity, command, response,
                            engagement_secs, evidence_path
                     FROM engagements ORDER BY id DESC"
                .to_string(),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let occurred_at: String = row.get(1)?;
                let severity: String = row.get(3)?;
                Ok(EngagementRow {
                    id: row.get(0)?,
                    occurred_at: DateTime::parse_from_rfc3339(&occurred_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    category: row.get(2)?,
                    severity: Severity::parse(&severity),
                    command: row.get(4)?,
                    response: row.get(5)?,
                    engagement_secs: row.get(6)?,
                    evidence_path: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(command: &str, severity: Severity) -> EngagementRow {
        EngagementRow {
            id: 0,
            occurred_at: Utc::now(),
            category: CATEGORY_DECEPTION.to_string(),
            severity,
            command: command.to_string(),
            response: "Query OK".to_string(),
            engagement_secs: 1.25,
            evidence_path: None,
        }
    }

    #[test]
    fn insert_returns_increasing_ids() {
        let store = ForensicStore::open_in_memory().unwrap();
        let a = store.insert(&make_row("a", Severity::Low)).unwrap();
        let b = store.insert(&make_row("b", Severity::High)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn recent_is_newest_first() {
        let store = ForensicStore::open_in_memory().unwrap();
        store.insert(&make_row("first", Severity::Low)).unwrap();
        store.insert(&make_row("second", Severity::High)).unwrap();
        let rows = store.recent(None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].command, "second");
        assert_eq!(rows[1].command, "first");
    }

    #[test]
    fn recent_respects_cap() {
        let store = ForensicStore::open_in_memory().unwrap();
        for i in 0..10 {
            store
                .insert(&make_row(&format!("cmd-{i}"), Severity::Low))
                .unwrap();
        }
        let rows = store.recent(Some(3)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].command, "cmd-9");
    }

    #[test]
    fn attach_evidence_updates_row() {
        let store = ForensicStore::open_in_memory().unwrap();
        let id = store
            .insert(&make_row("UNION SELECT 1", Severity::High))
            .unwrap();
        store.attach_evidence(id, "evidence/run-42.png").unwrap();
        let rows = store.recent(None).unwrap();
        assert_eq!(rows[0].evidence_path.as_deref(), Some("evidence/run-42.png"));
    }

    #[test]
    fn attach_evidence_to_missing_row_fails() {
        let store = ForensicStore::open_in_memory().unwrap();
        assert!(store.attach_evidence(999, "x").is_err());
    }

    #[test]
    fn severity_and_duration_round_trip() {
        let store = ForensicStore::open_in_memory().unwrap();
        let mut row = make_row("DROP TABLE users", Severity::Critical);
        row.engagement_secs = 0.0;
        store.insert(&row).unwrap();
        let rows = store.recent(None).unwrap();
        assert_eq!(rows[0].severity, Severity::Critical);
        assert_eq!(rows[0].engagement_secs, 0.0);
    }

    #[test]
    fn on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forensics.db");
        {
            let store = ForensicStore::open(&path).unwrap();
            store.insert(&make_row("persisted", Severity::Medium)).unwrap();
        }
        let store = ForensicStore::open(&path).unwrap();
        let rows = store.recent(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "persisted");
        assert_eq!(rows[0].severity, Severity::Medium);
    }
}
