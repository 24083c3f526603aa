use serde::{Deserialize, Serialize};

/// Default global token ceiling across all sessions.
pub const DEFAULT_GLOBAL_TOKEN_LIMIT: u64 = 1_000_000;

/// Default per-session token ceiling.
pub const DEFAULT_SESSION_TOKEN_LIMIT: u64 = 100_000;

/// Token ceilings enforced by the budget gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLimits {
    pub global_token_limit: u64,
    /// Limit assigned to a session record when it is lazily created
    pub session_token_limit: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            global_token_limit: DEFAULT_GLOBAL_TOKEN_LIMIT,
            session_token_limit: DEFAULT_SESSION_TOKEN_LIMIT,
        }
    }
}

/// Usage counters for one account (a session or the global aggregate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetStats {
    pub tokens: u64,
    pub cost: f64,
    pub limit: u64,
}

impl BudgetStats {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.tokens)
    }
}

/// Ledger-wide view used by the monitoring endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub global: BudgetStats,
    pub session_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_at_zero() {
        let stats = BudgetStats {
            tokens: 120,
            cost: 0.0,
            limit: 100,
        };
        assert_eq!(stats.remaining(), 0);
    }

    #[test]
    fn limits_deserialize_from_camel_case() {
        let limits: BudgetLimits =
            serde_json::from_str(r#"{"globalTokenLimit":500,"sessionTokenLimit":50}"#).unwrap();
        assert_eq!(limits.global_token_limit, 500);
        assert_eq!(limits.session_token_limit, 50);
    }
}
