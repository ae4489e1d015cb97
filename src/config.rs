//! Configuration loading from environment.
//!
//! Reads runtime configuration from environment variables; `.env` support
//! is provided by dotenvy in `main`.

use std::env;

use crate::error::{JobdeskError, Result};

/// Default access-token lifetime.
pub const DEFAULT_JWT_TTL_SECS: i64 = 3600;

/// Main configuration for the jobdesk server.
#[derive(Debug, Clone)]
pub struct JobdeskConfig {
    /// SQLite database file path.
    pub database_path: String,
    /// Socket address to bind the HTTP server to.
    pub bind_addr: String,
    /// Secret used to sign access tokens.
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub jwt_ttl_secs: i64,
    /// Whether to run the bootstrap seeder on startup.
    pub should_init: bool,
    /// Password assigned to seeded accounts.
    pub init_password: String,
}

impl JobdeskConfig {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `JWT_SECRET`: signing key for access tokens
    ///
    /// Optional environment variables:
    /// - `DATABASE_PATH`: SQLite file path (default: `data/jobdesk.db`)
    /// - `BIND_ADDR`: listen address (default: `0.0.0.0:8080`)
    /// - `JWT_TTL_SECS`: access token lifetime (default: 3600)
    /// - `SHOULD_INIT`: run the seeder when truthy (default: false)
    /// - `INIT_PASSWORD`: password for seeded accounts (default: `123456`)
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| JobdeskError::Config("JWT_SECRET not set".to_string()))?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "data/jobdesk.db".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let jwt_ttl_secs = env::var("JWT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_JWT_TTL_SECS);

        let should_init = env::var("SHOULD_INIT")
            .map(|s| parse_truthy(&s))
            .unwrap_or(false);

        let init_password = env::var("INIT_PASSWORD").unwrap_or_else(|_| "123456".to_string());

        Ok(Self {
            database_path,
            bind_addr,
            jwt_secret,
            jwt_ttl_secs,
            should_init,
            init_password,
        })
    }
}

/// Interpret common truthy spellings for boolean env vars.
fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
