//! Token budget accounting for gateway sessions.
//!
//! # Key Components
//!
//! - [`counter`]: Token estimation via character-length heuristic
//! - [`ledger`]: Per-session and global token/cost counters with a pre-spend gate
//! - [`types`]: Limits and stats snapshots shared with the HTTP layer

pub mod counter;
pub mod ledger;
pub mod types;

pub use counter::{estimate_tokens, HeuristicTokenCounter, SharedTokenCounter, TokenCounter};
pub use ledger::BudgetLedger;
pub use types::{BudgetLimits, BudgetSnapshot, BudgetStats};
