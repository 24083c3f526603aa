//! Advisory upstream health monitoring.
//!
//! Probes never gate traffic; only the circuit breaker rejects calls. The
//! monitor keeps a bounded history so the monitoring endpoint can show trends.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::Result;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// A lightweight request against the upstream, returning its HTTP status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<u16>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub checks: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub average_latency_ms: u64,
}

pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    timeout: Duration,
    capacity: usize,
    history: Mutex<VecDeque<HealthRecord>>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self::with_limits(probe, DEFAULT_PROBE_TIMEOUT, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_limits(probe: Arc<dyn HealthProbe>, timeout: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            probe,
            timeout,
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Probe once. 2xx is healthy, any other status degraded, and an error or
    /// a probe slower than the timeout unhealthy.
    pub async fn check_health(&self) -> HealthCheck {
        let start = Instant::now();
        let status = match tokio::time::timeout(self.timeout, self.probe.probe()).await {
            Ok(Ok(code)) if (200..300).contains(&code) => HealthStatus::Healthy,
            Ok(Ok(code)) => {
                log::warn!("Upstream health probe returned HTTP {}", code);
                HealthStatus::Degraded
            }
            Ok(Err(e)) => {
                log::warn!("Upstream health probe failed: {}", e);
                HealthStatus::Unhealthy
            }
            Err(_) => {
                log::warn!(
                    "Upstream health probe timed out after {}ms",
                    self.timeout.as_millis()
                );
                HealthStatus::Unhealthy
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        self.record(HealthRecord {
            timestamp: Utc::now(),
            status,
            latency_ms,
        });

        HealthCheck { status, latency_ms }
    }

    fn record(&self, record: HealthRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub fn latest(&self) -> Option<HealthRecord> {
        self.history.lock().back().cloned()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<HealthRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn summary(&self) -> HealthSummary {
        let history = self.history.lock();
        if history.is_empty() {
            return HealthSummary::default();
        }

        let mut summary = HealthSummary {
            checks: history.len(),
            ..HealthSummary::default()
        };
        let mut total_latency = 0u64;
        for record in history.iter() {
            match record.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
            }
            total_latency = total_latency.saturating_add(record.latency_ms);
        }
        summary.average_latency_ms = total_latency / history.len() as u64;
        summary
    }

    /// Probe on a fixed interval until `cancel` fires.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("Health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let check = self.check_health().await;
                        log::debug!(
                            "Upstream health: {:?} ({}ms)",
                            check.status,
                            check.latency_ms
                        );
                    }
                }
            }
        })
    }
}
