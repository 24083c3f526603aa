pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod state;
pub mod streaming;
