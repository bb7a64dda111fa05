//!
//! Gateway configuration
//! ---------------------
//! Defaults, then environment variables, then command-line flags. Each later source
//! overrides the earlier ones field by field.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_COOKIE_NAME;

/// Request body cap applied before any handler reads the body.
pub const BODY_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub bind: String,
    pub data_dir: String,
    /// Base URL of the protected backend; `None` disables the relay.
    pub upstream: Option<String>,
    pub cookie_name: String,
    pub settings_poll_secs: u64,
    pub body_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: 9800,
            bind: "0.0.0.0".to_string(),
            data_dir: "zerogate-data".to_string(),
            upstream: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            settings_poll_secs: 30,
            body_limit: BODY_LIMIT,
        }
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl GatewayConfig {
    /// Build from the process environment and the given argv.
    pub fn load(args: &[String]) -> Self {
        Self::from_sources(args, |name| std::env::var(name).ok())
    }

    pub fn from_sources<F>(args: &[String], env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(p) = env("ZEROGATE_HTTP_PORT").and_then(|v| v.parse().ok()) { cfg.http_port = p; }
        if let Some(b) = non_empty(env("ZEROGATE_BIND")) { cfg.bind = b; }
        if let Some(d) = non_empty(env("ZEROGATE_DATA_DIR")) { cfg.data_dir = d; }
        if let Some(u) = non_empty(env("ZEROGATE_UPSTREAM")) { cfg.upstream = Some(u); }
        if let Some(c) = non_empty(env("ZEROGATE_COOKIE_NAME")) { cfg.cookie_name = c; }
        if let Some(s) = env("ZEROGATE_SETTINGS_POLL_SEC").and_then(|v| v.parse().ok()) { cfg.settings_poll_secs = s; }

        // CLI arguments override environment
        if let Some(p) = arg_value(args, "--port").and_then(|v| v.parse().ok()) { cfg.http_port = p; }
        if let Some(b) = non_empty(arg_value(args, "--bind")) { cfg.bind = b; }
        if let Some(d) = non_empty(arg_value(args, "--data-dir")) { cfg.data_dir = d; }
        if let Some(u) = non_empty(arg_value(args, "--upstream")) { cfg.upstream = Some(u); }
        if let Some(c) = non_empty(arg_value(args, "--cookie-name")) { cfg.cookie_name = c; }
        if let Some(s) = arg_value(args, "--settings-poll").and_then(|v| v.parse().ok()) { cfg.settings_poll_secs = s; }

        cfg
    }

    pub fn settings_poll(&self) -> Duration {
        // zero would make tokio's interval panic
        Duration::from_secs(self.settings_poll_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = GatewayConfig::from_sources(&[], |_| None);
        assert_eq!(cfg, GatewayConfig::default());
        assert_eq!(cfg.cookie_name, "pritunl-zero");
        assert_eq!(cfg.body_limit, 1_000_000);
    }

    #[test]
    fn cli_overrides_env() {
        let env: HashMap<&str, &str> = [
            ("ZEROGATE_HTTP_PORT", "8000"),
            ("ZEROGATE_UPSTREAM", "http://env-backend"),
            ("ZEROGATE_COOKIE_NAME", "gw"),
            ("ZEROGATE_SETTINGS_POLL_SEC", "5"),
        ].into_iter().collect();
        let cfg = GatewayConfig::from_sources(
            &args(&["zerogate_server", "--port", "8443", "--upstream", "http://cli-backend"]),
            |k| env.get(k).map(|v| v.to_string()),
        );
        assert_eq!(cfg.http_port, 8443);
        assert_eq!(cfg.upstream.as_deref(), Some("http://cli-backend"));
        assert_eq!(cfg.cookie_name, "gw");
        assert_eq!(cfg.settings_poll(), Duration::from_secs(5));
    }

    #[test]
    fn junk_values_are_ignored() {
        let cfg = GatewayConfig::from_sources(
            &args(&["--port", "not-a-port", "--settings-poll", "0", "--upstream", "  "]),
            |_| None,
        );
        assert_eq!(cfg.http_port, 9800);
        assert!(cfg.upstream.is_none());
        assert_eq!(cfg.settings_poll(), Duration::from_secs(1));
    }
}
