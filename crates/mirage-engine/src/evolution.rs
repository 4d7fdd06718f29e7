//! Evolution engine: analyzes a past attack and synthesizes a blocking rule
//! plus a full replacement body for the protected artifact ("self-healing").
//!
//! A run walks `Idle -> Analyzing -> RuleProposed -> PatchApplying -> Done`,
//! with `Failed` terminal from `Analyzing` or `PatchApplying`. Runs are
//! serialized by a run-scoped lock: concurrent whole-file overwrites would
//! otherwise race on the artifact.
//!
//! The proposed rule is reported but never appended to the active rule set;
//! activating it is a separate operator decision, so the evolution loop can
//! never start blocking legitimate traffic on its own.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use mirage_core::config::GeneratorConfig;
use mirage_core::store::DefenseStore;

use crate::artifact::ProtectedArtifact;
use crate::generator::TextGenerator;
use crate::prompts;

/// Rule reported when the generator response does not parse. Match-everything
/// sentinel; like every proposed rule it is never auto-activated.
pub const FALLBACK_RULE: &str = "/.*/";

/// States of one evolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvolutionState {
    Idle,
    Analyzing,
    RuleProposed,
    PatchApplying,
    Done,
    Failed,
}

/// How a run obtains the attack to analyze.
///
/// The automated per-request path always uses `Payload` (non-destructive,
/// raw-log history preserved). `PopNewest` destructively dequeues the newest
/// unconsumed raw-log entry and exists only for explicit operator runs.
#[derive(Debug, Clone)]
pub enum AttackSource {
    Payload(String),
    PopNewest,
}

/// Structured fix proposal expected from the generator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixProposal {
    #[serde(default)]
    pub firewall_rule: String,
    #[serde(default)]
    pub code_patch: String,
    #[serde(default)]
    pub explanation: String,
}

/// Parse a (fence-stripped) generator response as a fix proposal.
pub fn parse_fix_proposal(raw: &str) -> Option<FixProposal> {
    serde_json::from_str(raw).ok()
}

/// Outcome of one evolution run.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionOutcome {
    pub success: bool,
    pub state: EvolutionState,
    pub analyzed_command: Option<String>,
    pub generated_rule: Option<String>,
    pub patch_applied: bool,
    pub message: Option<String>,
}

impl EvolutionOutcome {
    fn nothing_to_analyze() -> Self {
        Self {
            success: false,
            state: EvolutionState::Done,
            analyzed_command: None,
            generated_rule: None,
            patch_applied: false,
            message: Some("no new attacks to analyze".to_string()),
        }
    }

    fn failed(command: &str, rule: Option<String>, message: String) -> Self {
        Self {
            success: false,
            state: EvolutionState::Failed,
            analyzed_command: Some(command.to_string()),
            generated_rule: rule,
            patch_applied: false,
            message: Some(message),
        }
    }
}

pub struct EvolutionEngine {
    generator: Arc<dyn TextGenerator>,
    store: Arc<DefenseStore>,
    artifact: Arc<ProtectedArtifact>,
    config: GeneratorConfig,
    // At most one run at a time per artifact.
    run_lock: Mutex<()>,
}

impl EvolutionEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<DefenseStore>,
        artifact: Arc<ProtectedArtifact>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            generator,
            store,
            artifact,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Run one analysis. Never propagates an error to the caller; every
    /// failure mode lands in the returned outcome.
    pub async fn run(&self, source: AttackSource) -> EvolutionOutcome {
        let _guard = self.run_lock.lock().await;

        // Idle -> Analyzing: resolve the attack to analyze.
        let command = match source {
            AttackSource::Payload(command) => Some(command),
            AttackSource::PopNewest => match self.store.pop_attack() {
                Ok(entry) => entry.map(|e| e.command),
                Err(err) => {
                    warn!(error = %err, "raw-log pop failed");
                    None
                }
            },
        };
        let Some(command) = command else {
            // A normal, non-error outcome.
            return EvolutionOutcome::nothing_to_analyze();
        };

        let artifact_source = match self.artifact.read() {
            Ok(source) => source,
            Err(err) => return EvolutionOutcome::failed(&command, None, err.to_string()),
        };

        // Analyzing -> RuleProposed: ask for a structured fix.
        let request = prompts::build_evolution_request(&command, &artifact_source, &self.config);
        let raw = match self.generator.generate(&request).await {
            Ok(raw) => raw,
            Err(err) => return EvolutionOutcome::failed(&command, None, err.to_string()),
        };

        let proposal = parse_fix_proposal(&prompts::strip_code_fences(&raw)).unwrap_or_else(|| {
            // A parse failure degrades, it never fails the run.
            warn!("generator response did not parse as a fix proposal, using fallback rule");
            FixProposal {
                firewall_rule: FALLBACK_RULE.to_string(),
                ..FixProposal::default()
            }
        });

        if !proposal.firewall_rule.is_empty() {
            info!(rule = %proposal.firewall_rule, "candidate firewall rule generated (not activated)");
        }

        // RuleProposed -> PatchApplying -> Done.
        let mut patch_applied = false;
        if !proposal.code_patch.is_empty() {
            if let Err(err) = self.artifact.replace(&proposal.code_patch).await {
                // The rule proposal and analysis are not rolled back.
                return EvolutionOutcome::failed(
                    &command,
                    Some(proposal.firewall_rule),
                    err.to_string(),
                );
            }
            patch_applied = true;
            info!(path = %self.artifact.path().display(), "self-healing patch applied");

            let record = mirage_core::event::PatchRecord {
                applied_at: Utc::now(),
                trigger: command.clone(),
                rule: proposal.firewall_rule.clone(),
                patch: proposal.code_patch.clone(),
            };
            if let Err(err) = self.store.append_patch(&record) {
                warn!(error = %err, "failed to append patch record");
            }
        }

        EvolutionOutcome {
            success: true,
            state: EvolutionState::Done,
            analyzed_command: Some(command),
            generated_rule: (!proposal.firewall_rule.is_empty()).then_some(proposal.firewall_rule),
            patch_applied,
            message: (!proposal.explanation.is_empty()).then_some(proposal.explanation),
        }
    }
}
