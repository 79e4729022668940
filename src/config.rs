use crate::error::ConfigError;
use crate::rate_limit::{RateLimitConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_MS};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub webhook_secret: String,
    pub rate_limit: RateLimitConfig,
    /// Bearer token for the diagnostics routes; they are disabled when unset.
    pub diagnostics_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_secret = lookup("STRIPE_WEBHOOK_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?;

        let bind_addr = parse_or(&lookup, "WEBHOOK_BIND_ADDR", || {
            SocketAddr::from(([127, 0, 0, 1], 3000))
        })?;
        let max_attempts = parse_or(&lookup, "WEBHOOK_RATE_LIMIT_MAX", || DEFAULT_MAX_ATTEMPTS)?;
        let window_ms = parse_or(&lookup, "WEBHOOK_RATE_LIMIT_WINDOW_MS", || DEFAULT_WINDOW_MS)?;

        let diagnostics_token = lookup("DIAGNOSTICS_TOKEN").filter(|s| !s.trim().is_empty());

        Ok(Self {
            bind_addr,
            webhook_secret,
            rate_limit: RateLimitConfig {
                max_attempts: max_attempts.max(1),
                window_ms: window_ms.max(1),
            },
            diagnostics_token,
        })
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

fn parse_or<T, F, D>(lookup: &F, var: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> T,
{
    match lookup(var) {
        None => Ok(default()),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
