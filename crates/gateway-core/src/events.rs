//! Normalized events re-streamed to clients as SSE `data:` blocks.

use serde::Serialize;
use serde_json::{json, Value};

use crate::budget::BudgetStats;

/// Aggregates reported by the terminal `done` event.
#[derive(Debug, Clone, Serialize)]
pub struct DonePayload {
    pub tokens: u64,
    pub cost: f64,
    pub budget: BudgetStats,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Text { id: u64, delta: String },
    Done(DonePayload),
    Error { message: String, details: Option<Value> },
}

impl GatewayEvent {
    pub fn text(id: u64, delta: impl Into<String>) -> Self {
        GatewayEvent::Text {
            id,
            delta: delta.into(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<Value>) -> Self {
        GatewayEvent::Error {
            message: message.into(),
            details,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GatewayEvent::Text { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            GatewayEvent::Text { id, delta } => json!({
                "id": id,
                "type": "text",
                "data": delta,
            }),
            GatewayEvent::Done(payload) => json!({
                "id": "done",
                "type": "done",
                "data": payload,
            }),
            GatewayEvent::Error { message, details } => {
                let mut value = json!({
                    "id": "error",
                    "type": "error",
                    "data": message,
                });
                if let Some(details) = details {
                    value["details"] = details.clone();
                }
                value
            }
        }
    }

    /// One SSE message block, terminated by a blank line.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}
