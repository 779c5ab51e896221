// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! forksd entry point.

use std::sync::Arc;

use forks_adapters::{AgentAdapter, RemoteAgentAdapter};
use forksd::gateway::GatewayConfig;
use forksd::{env, Daemon};
use tracing_subscriber::EnvFilter;

fn init_tracing(root: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("FORKSD_LOG_TO_FILE").is_ok() {
        let appender = tracing_appender::rolling::daily(root.join("logs"), "forksd.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let Some(root) = env::forks_root() else {
        eprintln!("forksd: cannot determine the forks root (no home directory)");
        return std::process::ExitCode::FAILURE;
    };
    let _log_guard = init_tracing(&root);

    let adapter_url =
        std::env::var("FORKSD_ADAPTER_WS").unwrap_or_else(|_| "ws://127.0.0.1:8871".to_string());
    let adapter: Arc<dyn AgentAdapter> = match RemoteAgentAdapter::connect(&adapter_url).await {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::error!(url = %adapter_url, error = %e, "adapter service unreachable");
            return std::process::ExitCode::FAILURE;
        }
    };

    let config = GatewayConfig {
        auth_token: env::auth_token(),
        allowed_origins: env::allowed_origins(),
    };
    let daemon = match Daemon::build(adapter, &root, config) {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    let bind = env::bind_addr();
    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%bind, error = %e, "bind failed");
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(%bind, version = env::PROTOCOL_VERSION, "forksd listening");

    tokio::select! {
        _ = daemon.run(listener) => {}
        _ = shutdown_signal() => {
            daemon.shutdown().await;
        }
    }

    std::process::ExitCode::SUCCESS
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => return std::future::pending().await,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
