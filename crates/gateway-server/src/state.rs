use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gateway_core::{BudgetLedger, ContextStore, HeuristicTokenCounter, SharedTokenCounter};
use gateway_llm::{CircuitBreaker, GeminiProvider, HealthMonitor, HealthProbe, UpstreamProvider};

use crate::config::GatewayConfig;

/// Probe age after which the request path schedules a fresh probe when
/// periodic probing is disabled.
const DEFAULT_HEALTH_STALE_AFTER: Duration = Duration::from_secs(30);

/// Services shared by every request.
pub struct AppState {
    pub config: GatewayConfig,
    pub ledger: Arc<BudgetLedger>,
    pub breaker: Arc<CircuitBreaker>,
    pub health: Arc<HealthMonitor>,
    pub context: Arc<ContextStore>,
    pub upstream: Arc<dyn UpstreamProvider>,
    pub token_counter: SharedTokenCounter,
    pub started_at: Instant,
    probe_in_flight: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        log::info!(
            "Creating Gemini provider with base URL: {} and model: {}",
            config.upstream.base_url,
            config.upstream.model
        );
        let provider = Arc::new(
            GeminiProvider::new(config.upstream.api_key.clone())
                .with_base_url(config.upstream.base_url.clone())
                .with_model(config.upstream.model.clone()),
        );
        if !provider.is_configured() {
            log::warn!("No upstream API key configured; generation requests will be rejected");
        }

        Self::with_components(config, provider.clone(), provider)
    }

    pub fn with_components(
        config: GatewayConfig,
        upstream: Arc<dyn UpstreamProvider>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let ledger = Arc::new(BudgetLedger::new(config.budget_limits()));
        let breaker = Arc::new(CircuitBreaker::new("gemini", config.breaker_config()));
        let health = Arc::new(HealthMonitor::with_limits(
            probe,
            config.probe_timeout(),
            config.health_history_size,
        ));
        let context = Arc::new(ContextStore::new(config.context_window_size));

        Self {
            config,
            ledger,
            breaker,
            health,
            context,
            upstream,
            token_counter: Arc::new(HeuristicTokenCounter::default()),
            started_at: Instant::now(),
            probe_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn health_stale_after(&self) -> Duration {
        match self.config.health_check_interval_ms {
            0 => DEFAULT_HEALTH_STALE_AFTER,
            ms => Duration::from_millis(ms),
        }
    }

    /// Advisory health lookup for the request path. Never waits on the
    /// network: returns the cached record and schedules a background probe
    /// when it is missing or stale.
    pub fn advisory_health(&self, session_id: &str) {
        let latest = self.health.latest();
        let stale = match &latest {
            Some(record) => {
                let age = Utc::now().signed_duration_since(record.timestamp);
                age.to_std().map_or(false, |age| age > self.health_stale_after())
            }
            None => true,
        };

        if let Some(record) = &latest {
            log::debug!(
                "[{}] Upstream last seen {:?} ({}ms)",
                session_id,
                record.status,
                record.latency_ms
            );
        }

        if stale && !self.probe_in_flight.swap(true, Ordering::AcqRel) {
            let health = self.health.clone();
            let slot = ProbeSlot(self.probe_in_flight.clone());
            tokio::spawn(async move {
                let _slot = slot;
                health.check_health().await;
            });
        }
    }
}

/// Frees the single background-probe slot when the probe task ends, even by
/// panic or runtime shutdown.
struct ProbeSlot(Arc<AtomicBool>);

impl Drop for ProbeSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
