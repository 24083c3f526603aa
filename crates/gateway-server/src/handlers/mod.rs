pub mod context;
pub mod gateway;
pub mod monitor;
pub mod preflight;
