//! Re-streams the upstream body as gateway SSE events.

use std::sync::Arc;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::HttpResponse;
use futures_util::StreamExt;
use gateway_core::{BudgetLedger, ContextEntry, ContextStore, DonePayload, GatewayEvent};
use gateway_llm::{ByteStream, CircuitBreaker, FramingMode, Fragment, StreamReframer};

use crate::logging::Timer;

/// Per-response handles the stream needs after the handler returned.
pub struct StreamContext {
    pub session_id: String,
    pub ledger: Arc<BudgetLedger>,
    pub context: Arc<ContextStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub framing: FramingMode,
    pub cost_per_1k_tokens: f64,
}

/// Books usage exactly once, either when the stream ends or when it is
/// dropped early because the client went away.
struct Settlement {
    ctx: StreamContext,
    reframer: StreamReframer,
    text: String,
    settled: bool,
}

impl Settlement {
    fn new(ctx: StreamContext) -> Self {
        let reframer = StreamReframer::new(ctx.framing);
        Self {
            ctx,
            reframer,
            text: String::new(),
            settled: false,
        }
    }

    fn settle(&mut self) -> DonePayload {
        self.settled = true;
        let summary = self.reframer.finish();
        let tokens = summary.total_tokens;
        let cost = tokens as f64 / 1_000.0 * self.ctx.cost_per_1k_tokens;

        if tokens > 0 {
            self.ctx.ledger.track_usage(&self.ctx.session_id, tokens, cost);
        }
        if !self.text.is_empty() {
            let (entry_tokens, entry_cost) = if tokens > 0 {
                (Some(tokens), Some(cost))
            } else {
                (None, None)
            };
            self.ctx.context.add_to_context(
                &self.ctx.session_id,
                ContextEntry::assistant(std::mem::take(&mut self.text), entry_tokens, entry_cost),
            );
        }

        log::info!(
            "[{}] Stream settled: {} object(s), {} tokens, cost {:.6}",
            self.ctx.session_id,
            summary.objects,
            tokens,
            cost
        );

        DonePayload {
            tokens,
            cost,
            budget: self.ctx.ledger.session_stats(&self.ctx.session_id),
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!(
                "[{}] Client disconnected mid-stream; recording partial usage",
                self.ctx.session_id
            );
            self.settle();
        }
    }
}

fn frame(event: &GatewayEvent) -> Result<Bytes, actix_web::Error> {
    Ok(Bytes::from(event.to_sse_frame()))
}

/// Build the streaming response. Every stream ends with exactly one `done`
/// or `error` event, and reports the call's outcome to the breaker. A stream
/// dropped by the client reports nothing.
pub fn sse_response(body: ByteStream, ctx: StreamContext) -> HttpResponse {
    let stream = async_stream::stream! {
        let timer = Timer::new(format!("[{}] upstream stream", ctx.session_id));
        let breaker = ctx.breaker.clone();
        let session_id = ctx.session_id.clone();
        let mut settlement = Settlement::new(ctx);
        let mut body = body;
        let mut next_id: u64 = 0;

        log::debug!("[{}] streaming", session_id);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::error!("[{}] Upstream body failed mid-stream: {}", session_id, e);
                    breaker.record_failure();
                    settlement.settle();
                    yield frame(&GatewayEvent::error(
                        format!("Upstream error: {}", e),
                        Some(serde_json::json!({ "kind": "upstream_error" })),
                    ));
                    return;
                }
            };

            for fragment in settlement.reframer.push(&chunk) {
                match fragment {
                    Fragment::Text(delta) => {
                        next_id += 1;
                        settlement.text.push_str(&delta);
                        yield frame(&GatewayEvent::text(next_id, delta));
                    }
                    Fragment::UpstreamError(message) => {
                        log::error!("[{}] Upstream reported an error: {}", session_id, message);
                        breaker.record_failure();
                        settlement.settle();
                        yield frame(&GatewayEvent::error(
                            format!("Upstream error: {}", message),
                            Some(serde_json::json!({ "kind": "upstream_error" })),
                        ));
                        return;
                    }
                }
            }
        }

        let done = settlement.settle();
        breaker.record_success();
        timer.debug(&session_id);
        log::info!("[{}] completed: {} text event(s)", session_id, next_id);
        yield frame(&GatewayEvent::Done(done));
    };

    HttpResponse::Ok()
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}
