use actix_web::{web, HttpResponse};
use gateway_core::{ContextEntry, GatewayError};
use gateway_llm::{BreakerError, ByteStream, GeminiRequest, UpstreamError};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{sse_error_response, Result};
use crate::state::AppState;
use crate::streaming::{self, StreamContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub context: Option<Value>,
}

fn parse_request(body: &[u8]) -> std::result::Result<GatewayRequest, GatewayError> {
    let request: GatewayRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed JSON body: {}", e)))?;

    match request.message.as_deref() {
        Some(message) if !message.trim().is_empty() => Ok(request),
        _ => Err(GatewayError::InvalidRequest("message is required".to_string())),
    }
}

pub async fn handler(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse> {
    let request = parse_request(&body)?;
    let session_id = request
        .session_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    log::info!("[{}] received", session_id);

    match start_upstream(&state, &session_id, &request).await {
        Ok(body) => {
            let ctx = StreamContext {
                session_id,
                ledger: state.ledger.clone(),
                context: state.context.clone(),
                breaker: state.breaker.clone(),
                framing: state.config.framing_mode(),
                cost_per_1k_tokens: state.config.cost_per_1k_tokens,
            };
            Ok(streaming::sse_response(body, ctx))
        }
        Err(e) => {
            log::warn!("[{}] failed: {}", session_id, e);
            Ok(sse_error_response(&e))
        }
    }
}

/// Everything up to the first upstream byte. No upstream I/O happens unless
/// credentials, budget and breaker all admit the call.
async fn start_upstream(
    state: &AppState,
    session_id: &str,
    request: &GatewayRequest,
) -> std::result::Result<ByteStream, GatewayError> {
    if !state.upstream.is_configured() {
        return Err(GatewayError::Unconfigured);
    }

    state.advisory_health(session_id);
    log::debug!("[{}] health-checked", session_id);

    let message = request.message.clone().unwrap_or_default();
    let history = state.context.get_context(session_id);
    let estimated = state.token_counter.count_text(&message)
        + state.token_counter.count_entries(&history);

    if !state.ledger.check_budget(session_id, estimated) {
        let session = state.ledger.session_stats(session_id);
        let global = state.ledger.global_stats();
        log::warn!(
            "[{}] Budget exceeded: requested ~{} tokens, session {}/{}, global {}/{}",
            session_id,
            estimated,
            session.tokens,
            session.limit,
            global.tokens,
            global.limit
        );
        return Err(GatewayError::BudgetExceeded {
            session_id: session_id.to_string(),
            requested: estimated,
            session,
            global,
        });
    }
    log::debug!("[{}] budget-gated (~{} tokens)", session_id, estimated);

    // Recorded before the call so a failed generation still keeps the turn.
    let user_entry = ContextEntry::user(message);
    state.context.add_to_context(session_id, user_entry.clone());
    let mut contents = history;
    contents.push(user_entry);
    log::debug!("[{}] context-loaded ({} entries)", session_id, contents.len());

    let upstream_request = GeminiRequest::from_context(&contents, request.context.as_ref());
    let upstream = state.upstream.clone();

    // The breaker outcome is recorded by the stream once the body is consumed.
    log::debug!("[{}] upstream-calling", session_id);
    state
        .breaker
        .execute_deferred(|| async move { upstream.stream_generate(&upstream_request).await })
        .await
        .map_err(|e| match e {
            BreakerError::Open { retry_after, .. } => GatewayError::CircuitOpen {
                retry_after_ms: retry_after.as_millis() as u64,
                breaker: serde_json::to_value(state.breaker.stats()).unwrap_or(Value::Null),
            },
            BreakerError::Inner(UpstreamError::Unconfigured) => GatewayError::Unconfigured,
            BreakerError::Inner(e) => GatewayError::Upstream(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_or_blank_message() {
        for body in [r#"{}"#, r#"{"message":"   "}"#, r#"{"message":null}"#] {
            let err = parse_request(body.as_bytes()).unwrap_err();
            assert_eq!(err.status_code(), 400, "body: {}", body);
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let err = parse_request(b"{not json").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

    #[test]
    fn parses_optional_fields() {
        let request =
            parse_request(br#"{"message":"hi","sessionId":"s1","context":{"page":"home"}}"#)
                .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.context.unwrap()["page"], "home");
    }
}
