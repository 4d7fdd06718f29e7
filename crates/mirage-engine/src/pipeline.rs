//! The per-request pipeline: firewall, deception, triage, forensics,
//! evidence, evolution.
//!
//! Within one request the steps are strictly sequential. Failures in the
//! primary block/respond path surface to the caller; failures anywhere in
//! the side-effect chain (raw log, forensics, evidence, evolution) are
//! logged and absorbed so they never change the outcome already decided by
//! the firewall and responder.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use mirage_core::event::{BlockLogEntry, Outcome, RawLogEntry, Severity};
use mirage_core::firewall::{self, BLOCKED_RESPONSE};
use mirage_core::severity;
use mirage_core::store::{
    DefenseStore, EngagementRow, ForensicStore, CATEGORY_BLOCKED, CATEGORY_DECEPTION,
};

use crate::error::Result;
use crate::evidence::{self, EvidenceRequest, EvidenceService};
use crate::evolution::{AttackSource, EvolutionEngine};
use crate::responder::DeceptionResponder;

/// What the ingress reports back for one submitted command.
#[derive(Debug, Clone)]
pub struct Engagement {
    pub outcome: Outcome,
    pub severity: Severity,
    /// Text returned to the attacker: generated output, or the block
    /// sentinel.
    pub output: String,
    /// The rule that matched, when blocked.
    pub matched_rule: Option<String>,
}

pub struct Pipeline {
    store: Arc<DefenseStore>,
    forensics: Arc<ForensicStore>,
    responder: DeceptionResponder,
    evidence: Option<Arc<dyn EvidenceService>>,
    evolution: Arc<EvolutionEngine>,
    auto_evolve: bool,
}

impl Pipeline {
    pub fn new(
        store: Arc<DefenseStore>,
        forensics: Arc<ForensicStore>,
        responder: DeceptionResponder,
        evidence: Option<Arc<dyn EvidenceService>>,
        evolution: Arc<EvolutionEngine>,
        auto_evolve: bool,
    ) -> Self {
        Self {
            store,
            forensics,
            responder,
            evidence,
            evolution,
            auto_evolve,
        }
    }

    /// Handle one attacker command end to end.
    ///
    /// `client_timestamp_ms`, when present, is the client-reported send time
    /// used to compute the engagement duration.
    pub async fn handle(
        &self,
        command: &str,
        source_address: Option<String>,
        client_timestamp_ms: Option<i64>,
    ) -> Result<Engagement> {
        let received_at = Utc::now();

        // Record the raw attempt before evaluation, so the evolution
        // engine's pop mode sees blocked commands too. Best effort.
        let raw_entry = RawLogEntry {
            timestamp: received_at,
            command: command.to_string(),
            source_address: source_address.clone(),
        };
        if let Err(err) = self.store.record_attack(&raw_entry) {
            warn!(error = %err, "failed to record raw attack entry");
        }

        // Firewall: first match wins, store order.
        let rules = self.store.active_rules().unwrap_or_else(|err| {
            warn!(error = %err, "rule list unavailable, evaluating with empty set");
            Vec::new()
        });
        if let firewall::Verdict::Blocked { rule } = firewall::evaluate(command, &rules) {
            info!(rule = %rule, "command blocked by firewall");
            return Ok(self.handle_blocked(command, source_address, received_at, rule));
        }

        // Deception: a failure here is caller-visible by design.
        let response = self.responder.respond(command).await?;

        let severity = severity::classify(command);
        let engagement_secs = engagement_duration(received_at, client_timestamp_ms);

        // Forensic record; best effort.
        let row = EngagementRow {
            id: 0,
            occurred_at: received_at,
            category: CATEGORY_DECEPTION.to_string(),
            severity,
            command: command.to_string(),
            response: response.clone(),
            engagement_secs,
            evidence_path: None,
        };
        let record_id = match self.forensics.insert(&row) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "forensic insert failed");
                None
            }
        };

        // Evidence, only for medium-or-higher severity.
        if let Some(service) = &self.evidence {
            let request = EvidenceRequest {
                command: command.to_string(),
                severity,
                timestamp: received_at,
                source_address,
            };
            if let Some(reference) = evidence::maybe_capture(service.as_ref(), &request).await {
                match record_id {
                    Some(id) => {
                        if let Err(err) = self.forensics.attach_evidence(id, &reference) {
                            warn!(error = %err, "failed to link evidence reference");
                        }
                    }
                    None => warn!("evidence captured but no forensic record to link it to"),
                }
            }
        }

        // Evolution, payload-sourced so the raw log is preserved. The run
        // reports its own failures; nothing here can change the response.
        if self.auto_evolve {
            let outcome = self
                .evolution
                .run(AttackSource::Payload(command.to_string()))
                .await;
            debug!(
                success = outcome.success,
                patch_applied = outcome.patch_applied,
                rule = outcome.generated_rule.as_deref().unwrap_or(""),
                "evolution run finished"
            );
        }

        Ok(Engagement {
            outcome: Outcome::Allowed,
            severity,
            output: response,
            matched_rule: None,
        })
    }

    /// Block side effects: block log plus a forensic record with fixed
    /// severity, sentinel response, and zero duration.
    fn handle_blocked(
        &self,
        command: &str,
        source_address: Option<String>,
        received_at: DateTime<Utc>,
        rule: String,
    ) -> Engagement {
        let entry = BlockLogEntry {
            timestamp: received_at,
            command: command.to_string(),
            source_address,
            rule: rule.clone(),
        };
        if let Err(err) = self.store.record_block(&entry) {
            warn!(error = %err, "failed to record block entry");
        }

        // A rule hit is confirmed malicious by policy.
        let row = EngagementRow {
            id: 0,
            occurred_at: received_at,
            category: CATEGORY_BLOCKED.to_string(),
            severity: Severity::Critical,
            command: command.to_string(),
            response: BLOCKED_RESPONSE.to_string(),
            engagement_secs: 0.0,
            evidence_path: None,
        };
        if let Err(err) = self.forensics.insert(&row) {
            warn!(error = %err, "forensic insert failed for blocked command");
        }

        Engagement {
            outcome: Outcome::Blocked,
            severity: Severity::Critical,
            output: BLOCKED_RESPONSE.to_string(),
            matched_rule: Some(rule),
        }
    }
}

/// Wall-clock seconds from receipt (or the client-reported send time) to
/// now. Negative clock skew clamps to zero.
fn engagement_duration(received_at: DateTime<Utc>, client_timestamp_ms: Option<i64>) -> f64 {
    let start = client_timestamp_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or(received_at);
    let elapsed = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
    elapsed.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_receipt_is_non_negative() {
        let secs = engagement_duration(Utc::now(), None);
        assert!(secs >= 0.0);
        assert!(secs < 5.0);
    }

    #[test]
    fn duration_clamps_future_client_timestamp() {
        let future_ms = (Utc::now().timestamp_millis()) + 60_000;
        assert_eq!(engagement_duration(Utc::now(), Some(future_ms)), 0.0);
    }

    #[test]
    fn duration_uses_client_timestamp_when_given() {
        let past_ms = Utc::now().timestamp_millis() - 2_000;
        let secs = engagement_duration(Utc::now(), Some(past_ms));
        assert!(secs >= 2.0);
        assert!(secs < 10.0);
    }
}
