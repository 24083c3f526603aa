pub mod breaker;
pub mod health;
pub mod protocol;
pub mod provider;
pub mod providers;

pub use breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Clock,
    SystemClock,
};
pub use health::{HealthCheck, HealthMonitor, HealthProbe, HealthRecord, HealthStatus, HealthSummary};
pub use protocol::gemini::{GeminiContent, GeminiPart, GeminiRequest};
pub use provider::{ByteStream, Result, UpstreamError, UpstreamProvider};
pub use providers::gemini::{FrameSummary, FramingMode, Fragment, GeminiProvider, StreamReframer};
