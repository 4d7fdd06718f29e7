//! HTTP surface: attacker ingress, read-only observer queries, and the
//! operator-gated actions (rule activation, manual evolution).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use mirage_core::firewall;
use mirage_core::store::EngagementRow;
use mirage_engine::artifact::PatchStatus;
use mirage_engine::evolution::{AttackSource, EvolutionOutcome};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/honeypot", post(submit_command))
        .route("/api/rules", get(rules_status).post(activate_rule))
        .route("/api/logs", get(logs_split))
        .route("/api/logs/db", get(logs_all))
        .route("/api/stats", get(stats))
        .route("/api/evolve", post(evolve))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Ingress
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    command: Option<String>,
    /// Client-reported send time in epoch milliseconds.
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    output: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn submit_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(command) = body.command.filter(|c| !c.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "command required".to_string(),
            }),
        ));
    };

    let source_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state
        .pipeline
        .handle(&command, source_address, body.timestamp)
        .await
    {
        Ok(engagement) => Ok(Json(SubmitResponse {
            output: engagement.output,
        })),
        Err(err) => {
            // Details stay in the log; the attacker sees a generic payload.
            warn!(error = %err, "engagement failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Observer surface (read-only)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RulesStatusResponse {
    rules: Vec<String>,
    patches: Vec<mirage_core::event::PatchRecord>,
    patch_status: PatchStatus,
}

async fn rules_status(State(state): State<AppState>) -> Json<RulesStatusResponse> {
    let rules = state.store.active_rules().unwrap_or_else(|err| {
        warn!(error = %err, "rule list unavailable");
        Vec::new()
    });
    let patches = state.store.patch_history().unwrap_or_else(|err| {
        warn!(error = %err, "patch history unavailable");
        Vec::new()
    });
    Json(RulesStatusResponse {
        rules,
        patches,
        patch_status: state.artifact.status(),
    })
}

#[derive(Debug, Serialize)]
struct LogsSplitResponse {
    trapped: Vec<EngagementRow>,
    blocked: Vec<EngagementRow>,
}

const LOGS_CAP: usize = 500;

async fn logs_split(State(state): State<AppState>) -> Json<LogsSplitResponse> {
    let rows = state.forensics.recent(Some(LOGS_CAP)).unwrap_or_else(|err| {
        warn!(error = %err, "forensic query failed");
        Vec::new()
    });
    let (blocked, trapped): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|r| r.category == mirage_core::store::CATEGORY_BLOCKED);
    Json(LogsSplitResponse { trapped, blocked })
}

async fn logs_all(State(state): State<AppState>) -> Json<Vec<EngagementRow>> {
    Json(state.forensics.recent(None).unwrap_or_else(|err| {
        warn!(error = %err, "forensic query failed");
        Vec::new()
    }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    hits: usize,
    rules: usize,
    blocked: usize,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    match state.store.counts() {
        Ok(counts) => Json(StatsResponse {
            hits: counts.attacks,
            rules: counts.rules,
            blocked: counts.blocked,
        }),
        Err(err) => {
            warn!(error = %err, "stats query failed");
            Json(StatsResponse {
                hits: 0,
                rules: 0,
                blocked: 0,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Operator surface
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ActivateRuleRequest {
    rule: String,
}

/// Activate a rule into the live set. This is the explicit gate between a
/// synthesized rule and live blocking.
async fn activate_rule(
    State(state): State<AppState>,
    Json(body): Json<ActivateRuleRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if let Err(err) = firewall::compile_rule(&body.rule) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("rule does not compile: {err}"),
            }),
        ));
    }
    match state.store.append_rule(&body.rule) {
        Ok(()) => Ok(StatusCode::CREATED),
        Err(err) => {
            warn!(error = %err, "rule activation failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            ))
        }
    }
}

/// Run the evolution engine on the newest unconsumed raw-log entry
/// (destructive dequeue).
async fn evolve(State(state): State<AppState>) -> Json<EvolutionOutcome> {
    Json(state.evolution.run(AttackSource::PopNewest).await)
}
