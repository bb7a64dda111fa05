//!
//! zerogate server binary
//! ----------------------
//! Command-line entry point for the gateway. Configuration comes from defaults,
//! ZEROGATE_* environment variables and CLI flags, in that order.

use anyhow::Result;
use std::env;

use zerogate::config::GatewayConfig;

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("zerogate Server\n\nUSAGE:\n  zerogate_server [--port N] [--bind ADDR] [--data-dir PATH] [--upstream URL] [--cookie-name NAME] [--settings-poll SECS]\n\nOPTIONS:\n  --port N               HTTP port (env: ZEROGATE_HTTP_PORT, default 9800)\n  --bind ADDR            Listen address (env: ZEROGATE_BIND, default 0.0.0.0)\n  --data-dir PATH        Record store folder (env: ZEROGATE_DATA_DIR, default zerogate-data)\n  --upstream URL         Backend to relay authenticated requests to (env: ZEROGATE_UPSTREAM)\n  --cookie-name NAME     Session cookie name (env: ZEROGATE_COOKIE_NAME, default pritunl-zero)\n  --settings-poll SECS   Settings refresh interval (env: ZEROGATE_SETTINGS_POLL_SEC, default 30)\n");
        return Ok(());
    }

    let config = GatewayConfig::load(&args);
    if config.upstream.is_none() {
        tracing::warn!("no upstream configured; authenticated requests outside the gateway's own routes will get 404");
    }
    zerogate::server::run(config).await
}
