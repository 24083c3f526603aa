use serde_json::{json, Value};
use thiserror::Error;

use crate::budget::BudgetStats;

/// Failures surfaced by the gateway request lifecycle.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream credentials are not configured")]
    Unconfigured,

    #[error(
        "Token budget exceeded for session '{session_id}': requested {requested}, session {}/{}, global {}/{}",
        .session.tokens, .session.limit, .global.tokens, .global.limit
    )]
    BudgetExceeded {
        session_id: String,
        requested: u64,
        session: BudgetStats,
        global: BudgetStats,
    },

    #[error("Circuit breaker is open; retry in {retry_after_ms}ms")]
    CircuitOpen {
        retry_after_ms: u64,
        breaker: Value,
    },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Failed to parse upstream fragment: {0}")]
    Parse(String),
}

impl GatewayError {
    /// HTTP status equivalent for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::Unconfigured => 500,
            GatewayError::BudgetExceeded { .. } => 429,
            GatewayError::CircuitOpen { .. } => 503,
            GatewayError::Upstream(_) => 502,
            GatewayError::Parse(_) => 502,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Unconfigured => "unconfigured",
            GatewayError::BudgetExceeded { .. } => "budget_exceeded",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::Parse(_) => "parse_error",
        }
    }

    /// Structured payload a caller can base its retry policy on.
    pub fn details(&self) -> Value {
        match self {
            GatewayError::BudgetExceeded {
                session_id,
                requested,
                session,
                global,
            } => json!({
                "kind": self.kind(),
                "sessionId": session_id,
                "requested": requested,
                "session": session,
                "global": global,
            }),
            GatewayError::CircuitOpen {
                retry_after_ms,
                breaker,
            } => json!({
                "kind": self.kind(),
                "retryAfterMs": retry_after_ms,
                "circuitBreaker": breaker,
            }),
            other => json!({ "kind": other.kind() }),
        }
    }
}
