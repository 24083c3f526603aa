use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorQuery {
    pub session_id: Option<String>,
}

/// Monitoring snapshot of every gateway component.
pub async fn handler(
    state: web::Data<AppState>,
    query: web::Query<MonitorQuery>,
) -> Result<HttpResponse> {
    let budget = state.ledger.snapshot();
    let mut budget = serde_json::to_value(&budget)?;
    if let Some(session_id) = query.session_id.as_deref() {
        // Read-only: an unknown session is reported as null, not created.
        budget["session"] = serde_json::to_value(state.ledger.find_session_stats(session_id))?;
    }

    let snapshot = json!({
        "timestamp": Utc::now(),
        "health": {
            "latest": state.health.latest(),
            "summary": state.health.summary(),
            "history": state.health.history(),
        },
        "circuitBreaker": state.breaker.stats(),
        "context": state.context.stats(),
        "budget": budget,
        "uptime": state.uptime().as_secs(),
    });

    Ok(HttpResponse::Ok().json(snapshot))
}
