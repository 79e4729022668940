pub mod config;
pub mod error;
pub mod events;
pub mod http_server;
pub mod monitor;
pub mod rate_limit;
pub mod types;
pub mod verification;

pub use crate::config::Config;
pub use crate::error::{ApiError, ConfigError};
pub use crate::http_server::{router, AppState};
pub use crate::monitor::ErrorMonitor;
pub use crate::rate_limit::{RateLimitConfig, RateLimiter};
pub use crate::types::{ErrorLogEntry, PaymentEvent};
