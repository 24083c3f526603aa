//! In-memory token/cost ledger.
//!
//! Usage lives for the lifetime of the process only; nothing is persisted
//! across restarts. Session records are created on first reference and are
//! never evicted.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::types::{BudgetLimits, BudgetSnapshot, BudgetStats};

#[derive(Debug, Clone, Copy)]
struct Account {
    tokens_used: u64,
    cost_used: f64,
    token_limit: u64,
}

impl Account {
    fn new(token_limit: u64) -> Self {
        Self {
            tokens_used: 0,
            cost_used: 0.0,
            token_limit,
        }
    }

    fn admits(&self, estimated_tokens: u64) -> bool {
        self.tokens_used.saturating_add(estimated_tokens) <= self.token_limit
    }

    fn add(&mut self, tokens: u64, cost: f64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        self.cost_used += cost;
    }

    fn stats(&self) -> BudgetStats {
        BudgetStats {
            tokens: self.tokens_used,
            cost: self.cost_used,
            limit: self.token_limit,
        }
    }
}

#[derive(Debug)]
struct LedgerInner {
    global: Account,
    sessions: HashMap<String, Account>,
}

/// Per-session and global token budgets.
///
/// A single mutex guards both levels so a gate check sees a consistent view.
/// The lock is only held for the read-modify-write itself.
#[derive(Debug)]
pub struct BudgetLedger {
    limits: BudgetLimits,
    inner: Mutex<LedgerInner>,
}

impl BudgetLedger {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(LedgerInner {
                global: Account::new(limits.global_token_limit),
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    /// Returns true when `estimated_tokens` fits under both the global and the
    /// session limit. Creates a zeroed session record on first reference.
    pub fn check_budget(&self, session_id: &str, estimated_tokens: u64) -> bool {
        let default_limit = self.limits.session_token_limit;
        let mut inner = self.inner.lock();
        let global_ok = inner.global.admits(estimated_tokens);
        let session = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Account::new(default_limit));
        global_ok && session.admits(estimated_tokens)
    }

    /// Records completed usage against the session and the global aggregate.
    ///
    /// Not idempotent: call exactly once per completed generation.
    pub fn track_usage(&self, session_id: &str, tokens: u64, cost: f64) {
        let default_limit = self.limits.session_token_limit;
        let mut inner = self.inner.lock();
        inner.global.add(tokens, cost);
        inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Account::new(default_limit))
            .add(tokens, cost);
        log::debug!(
            "[{}] tracked {} tokens (${:.6}), global now {}",
            session_id,
            tokens,
            cost,
            inner.global.tokens_used
        );
    }

    pub fn session_stats(&self, session_id: &str) -> BudgetStats {
        let default_limit = self.limits.session_token_limit;
        let mut inner = self.inner.lock();
        inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Account::new(default_limit))
            .stats()
    }

    /// Like [`Self::session_stats`] but without creating a record.
    pub fn find_session_stats(&self, session_id: &str) -> Option<BudgetStats> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(Account::stats)
    }

    pub fn global_stats(&self) -> BudgetStats {
        self.inner.lock().global.stats()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Zeroes a session's counters, keeping its limit. Global totals are kept:
    /// they describe spend that already happened.
    pub fn reset_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(account) = inner.sessions.get_mut(session_id) {
            account.tokens_used = 0;
            account.cost_used = 0.0;
            log::info!("[{}] session budget reset", session_id);
        }
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let inner = self.inner.lock();
        BudgetSnapshot {
            global: inner.global.stats(),
            session_count: inner.sessions.len(),
        }
    }
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new(BudgetLimits::default())
    }
}
