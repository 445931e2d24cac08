// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Real-time chat client transport.
#[derive(Debug, Clone, Parser)]
#[command(name = "parley", version, about)]
pub struct Config {
    /// Chat server host.
    #[arg(long, env = "PARLEY_HOST", default_value = "localhost")]
    pub host: String,

    /// Chat server WebSocket port.
    #[arg(long, env = "PARLEY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Session token issued by the auth service.
    #[arg(long, env = "PARLEY_TOKEN", default_value = "")]
    pub token: String,

    /// Numeric id of the logged-in user.
    #[arg(long, env = "PARLEY_USER_ID", default_value_t = 0)]
    pub user_id: i64,

    /// Origin header sent with the upgrade request.
    #[arg(long, env = "PARLEY_ORIGIN", default_value = "http://localhost")]
    pub origin: String,

    /// Base URL of the REST service.
    #[arg(long, env = "PARLEY_API_URL", default_value = "http://localhost:8088")]
    pub api_url: String,

    /// Log format (json or text).
    #[arg(long, env = "PARLEY_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "PARLEY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub handshake_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub response_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub heartbeat_interval_ms: Option<u64>,
    #[clap(skip)]
    pub heartbeat_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub logout_timeout_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.trim().is_empty() {
            anyhow::bail!("--token is required");
        }
        if self.port == 0 {
            anyhow::bail!("--port must be non-zero");
        }
        if self.host.trim().is_empty() {
            anyhow::bail!("--host must not be empty");
        }
        if self.heartbeat_timeout() >= self.heartbeat_interval() {
            anyhow::bail!(
                "heartbeat timeout ({:?}) must be shorter than the heartbeat interval ({:?})",
                self.heartbeat_timeout(),
                self.heartbeat_interval()
            );
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// Upgrade endpoint: `ws://<host>:<port>/ws`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(handshake_timeout, handshake_timeout_ms, "PARLEY_HANDSHAKE_TIMEOUT_MS", 10_000);
    duration_field!(response_timeout, response_timeout_ms, "PARLEY_RESPONSE_TIMEOUT_MS", 5_000);
    duration_field!(
        heartbeat_interval,
        heartbeat_interval_ms,
        "PARLEY_HEARTBEAT_INTERVAL_MS",
        10_000
    );
    duration_field!(heartbeat_timeout, heartbeat_timeout_ms, "PARLEY_HEARTBEAT_TIMEOUT_MS", 5_000);
    duration_field!(logout_timeout, logout_timeout_ms, "PARLEY_LOGOUT_TIMEOUT_MS", 2_000);

    /// Build a minimal `Config` for tests with short timings.
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            token: "test-token".into(),
            user_id: 1,
            origin: "http://localhost".into(),
            api_url: "http://127.0.0.1:0".into(),
            log_format: "text".into(),
            log_level: "debug".into(),
            handshake_timeout_ms: Some(2_000),
            response_timeout_ms: Some(300),
            heartbeat_interval_ms: Some(60_000),
            heartbeat_timeout_ms: Some(300),
            logout_timeout_ms: Some(300),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
