//! ghp-guard: validating relay between a PLC and a GHP ComCell endpoint.
//!
//! Listens for PLC connections, forwards traffic to the GHP endpoint, and
//! blocks controller messages known to crash it, answering the PLC with an
//! `ERROR` reply instead.

mod config;
mod event_log;
mod proxy;

use config::GuardConfig;
use event_log::{FileEventLog, SharedEventLog};
use proxy::{ControllerListener, RelaySettings, SessionContext};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let loaded = GuardConfig::from_env();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let fallback_level = loaded
        .as_ref()
        .map(|cfg| cfg.log_level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let log: SharedEventLog = match FileEventLog::open(&config.log_file) {
        Ok(log) => Arc::new(log.with_console(config.log_console)),
        Err(e) => {
            error!(path = %config.log_file.display(), error = %e, "failed to open event log");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.listen_port,
        upstream = %config.upstream_addr(),
        framing = ?config.framing,
        "starting ghp-guard"
    );
    log.log("=== Proxy started ===");
    log.log(&format!(
        "Listening on port {}, forwarding to {}:{}",
        config.listen_port, config.upstream_host, config.upstream_port
    ));

    let ctx = Arc::new(SessionContext {
        upstream_addr: config.upstream_addr(),
        settings: RelaySettings::from(&config),
        log: log.clone(),
    });

    let listener = match ControllerListener::bind(config.listen_port, ctx).await {
        Ok(listener) => {
            if let Ok(addr) = listener.local_addr() {
                info!(addr = %addr, "accepting PLC connections");
            }
            listener
        }
        Err(e) => {
            log.log(&format!("Error: {e}"));
            error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = listener.run() => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    log.log("=== Proxy stopped ===");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
