//! Conditional evidence capture for medium-or-higher severity engagements.
//!
//! Capture runs synchronously before the request completes, so the evidence
//! exists by the time the engagement is reported as logged. A collaborator
//! failure never reaches the attacker: the event is simply persisted without
//! a reference.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use mirage_core::event::Severity;

use crate::error::{EngineError, Result};

/// Request sent to the external evidence-capture collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRequest {
    pub command: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub source_address: Option<String>,
}

/// Trait for evidence capture services.
#[async_trait]
pub trait EvidenceService: Send + Sync {
    /// Capture evidence for one engagement, returning a reference (URL or
    /// path) to the captured material.
    async fn capture(&self, request: &EvidenceRequest) -> Result<String>;
}

/// Capture evidence iff the severity warrants it.
///
/// Fires only for `Medium`, `High`, and `Critical`. Returns `None` both when
/// the severity is `Low` and when the collaborator fails; failures are
/// logged for operators and otherwise absorbed.
pub async fn maybe_capture(
    service: &dyn EvidenceService,
    request: &EvidenceRequest,
) -> Option<String> {
    if request.severity < Severity::Medium {
        return None;
    }
    match service.capture(request).await {
        Ok(reference) => Some(reference),
        Err(err) => {
            warn!(severity = %request.severity, error = %err, "evidence capture failed");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP evidence service
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CaptureResponse {
    reference: String,
}

/// Posts capture requests to a configured endpoint with a bounded timeout.
pub struct HttpEvidenceService {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpEvidenceService {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("building HTTP client");
        Self { http, endpoint }
    }
}

#[async_trait]
impl EvidenceService for HttpEvidenceService {
    async fn capture(&self, request: &EvidenceRequest) -> Result<String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::EvidenceCapture(e.to_string()))?
            .error_for_status()
            .map_err(|e| EngineError::EvidenceCapture(e.to_string()))?;
        let parsed: CaptureResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::EvidenceCapture(e.to_string()))?;
        Ok(parsed.reference)
    }
}

// ---------------------------------------------------------------------------
// Mock evidence service (for testing)
// ---------------------------------------------------------------------------

/// Scripted evidence service recording every capture request.
#[derive(Default)]
pub struct MockEvidenceService {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<EvidenceRequest>>,
}

impl MockEvidenceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reference(&self, reference: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(reference.to_string()));
    }

    pub fn push_failure(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(EngineError::EvidenceCapture("unreachable".to_string())));
    }

    pub fn calls(&self) -> Vec<EvidenceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvidenceService for MockEvidenceService {
    async fn capture(&self, request: &EvidenceRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("evidence/{}.png", self.calls.lock().unwrap().len())),
        }
    }
}
