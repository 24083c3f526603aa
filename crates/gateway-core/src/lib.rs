pub mod budget;
pub mod context;
pub mod error;
pub mod events;

pub use budget::{
    estimate_tokens, BudgetLedger, BudgetLimits, BudgetSnapshot, BudgetStats,
    HeuristicTokenCounter, SharedTokenCounter, TokenCounter,
};
pub use context::{ContextEntry, ContextStats, ContextStore, Role, DEFAULT_CONTEXT_WINDOW};
pub use error::GatewayError;
pub use events::{DonePayload, GatewayEvent};
