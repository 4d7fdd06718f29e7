//! Typed accessor over the ordered list store.
//!
//! Owns the list names and the JSON encoding of log entries so the rest of
//! the pipeline never touches raw list values.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use crate::event::{BlockLogEntry, PatchRecord, RawLogEntry};

use super::list::ListStore;

const RULES: &str = "rules";
const ATTACK_LOG: &str = "attack_log";
const BLOCK_LOG: &str = "block_log";
const PATCH_HISTORY: &str = "patch_history";

/// Counters for the observer stats surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub attacks: usize,
    pub rules: usize,
    pub blocked: usize,
}

/// Accessor for active rules, raw/block logs, and patch history.
pub struct DefenseStore {
    store: Arc<dyn ListStore>,
}

impl DefenseStore {
    pub fn new(store: Arc<dyn ListStore>) -> Self {
        Self { store }
    }

    /// Active blocking rules, store order (newest first).
    pub fn active_rules(&self) -> Result<Vec<String>> {
        self.store.list(RULES)
    }

    /// Activate a rule by appending it to the live rule list.
    ///
    /// This is the operator-gated activation step; the evolution engine never
    /// calls it.
    pub fn append_rule(&self, rule: &str) -> Result<()> {
        self.store.push(RULES, rule)
    }

    /// Record a raw submission before firewall evaluation.
    pub fn record_attack(&self, entry: &RawLogEntry) -> Result<()> {
        self.store.push(ATTACK_LOG, &serde_json::to_string(entry)?)
    }

    /// Destructively pop the newest unconsumed raw-log entry.
    ///
    /// An entry that no longer parses as JSON is treated as a bare command
    /// rather than dropped.
    pub fn pop_attack(&self) -> Result<Option<RawLogEntry>> {
        let Some(raw) = self.store.pop(ATTACK_LOG)? else {
            return Ok(None);
        };
        let entry = serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "raw-log entry is not JSON, treating as bare command");
            RawLogEntry {
                timestamp: Utc::now(),
                command: raw,
                source_address: None,
            }
        });
        Ok(Some(entry))
    }

    /// Record a blocked submission.
    pub fn record_block(&self, entry: &BlockLogEntry) -> Result<()> {
        self.store.push(BLOCK_LOG, &serde_json::to_string(entry)?)
    }

    /// Append a patch record to the append-only history.
    pub fn append_patch(&self, record: &PatchRecord) -> Result<()> {
        self.store.push(PATCH_HISTORY, &serde_json::to_string(record)?)
    }

    /// Patch history, newest first. Entries that fail to parse are skipped.
    pub fn patch_history(&self) -> Result<Vec<PatchRecord>> {
        Ok(self
            .store
            .list(PATCH_HISTORY)?
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect())
    }

    /// Counters for the stats surface.
    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            attacks: self.store.len(ATTACK_LOG)?,
            rules: self.store.len(RULES)?,
            blocked: self.store.len(BLOCK_LOG)?,
        })
    }
}
