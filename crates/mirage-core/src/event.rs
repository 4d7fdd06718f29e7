//! Attack event model shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity tier assigned to an engagement.
///
/// Ordered so that `Medium <= High` style comparisons work; the evidence
/// trigger fires for anything at or above [`Severity::Medium`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    /// Parse a persisted severity string. Unknown values map to `Low` so
    /// reading old records never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "Critical" => Severity::Critical,
            "High" => Severity::High,
            "Medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firewall decision for one submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Blocked,
    Allowed,
}

/// One raw submission, appended to the attack log before firewall
/// evaluation. This is the entry consumed by the evolution engine's
/// pop-sourcing mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    #[serde(default)]
    pub source_address: Option<String>,
}

/// A blocked submission, appended to the block log alongside the forensic
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    #[serde(default)]
    pub source_address: Option<String>,
    /// The raw rule text that matched.
    pub rule: String,
}

/// Result of one evolution engine run, appended to the patch history.
/// Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecord {
    pub applied_at: DateTime<Utc>,
    /// The command that was analyzed.
    pub trigger: String,
    /// The blocking rule the generator proposed (not auto-activated).
    pub rule: String,
    /// Full replacement body written to the protected artifact.
    pub patch: String,
}
