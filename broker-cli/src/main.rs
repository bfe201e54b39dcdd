use std::sync::Arc;

use anyhow::Result;
use broker_cli::{cli::Cli, stdio};
use broker_core::{logging, BrokerConfig, CodebaseRegistry, Dispatcher, DownstreamSupervisor, HeartbeatScheduler, NoopSink, SessionManager, TaskRegistry};
use broker_server::BrokerHttpServer;
use clap::Parser;

/// Wires the four crates into a running broker and drives whichever
/// transports `MCP_INTERFACE_MODE` (or `--interface-mode`) names, the same
/// parse-flags-then-dispatch-to-a-server-runner shape as
/// `server/distri-server-cli/src/main.rs`.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);
    dotenv::dotenv().ok();

    let mut config = BrokerConfig::from_env();
    if let Some(path) = cli.config {
        config.mcp_config_file = path;
    }
    if let Some(mode) = cli.interface_mode {
        config.interface_mode = mode;
    }
    if let Some(host) = cli.host {
        config.http_host = host;
    }
    if let Some(port) = cli.port {
        config.http_port = port;
    }

    let sink: Arc<dyn broker_core::EventSink> = Arc::new(NoopSink);
    let sessions = SessionManager::new();
    let codebases = CodebaseRegistry::new(sink.clone());
    let tasks = TaskRegistry::new(codebases.clone(), sessions.clone(), sink.clone());

    let supervisor = Arc::new(DownstreamSupervisor::new(sink.clone()));
    let downstream_config = DownstreamSupervisor::load_config(&config.mcp_config_file)?;
    supervisor.start_all_and_monitor(downstream_config).await;

    let heartbeat = HeartbeatScheduler::new(tasks.clone(), config.heartbeat_interval);
    let dispatcher = Arc::new(
        Dispatcher::new(tasks, codebases, sessions.clone(), supervisor.clone())
            .with_heartbeat_scheduler(heartbeat.clone()),
    );

    let _sweeper = Arc::new(sessions).spawn_sweeper(config.default_session_ttl / 12).await;

    let modes = config.interface_modes();
    tracing::info!(?modes, host = %config.http_host, port = config.http_port, "starting mcp-broker");

    let mut handles = Vec::new();
    if modes.iter().any(|m| m == "stdio") {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move { stdio::serve(dispatcher).await }));
    }
    if modes.iter().any(|m| m == "http" || m == "websocket" || m == "all") {
        let server = BrokerHttpServer::new(dispatcher.clone());
        let host = config.http_host.clone();
        let port = config.http_port;
        handles.push(tokio::spawn(async move { server.start(&host, port).await }));
    }

    if handles.is_empty() {
        anyhow::bail!("MCP_INTERFACE_MODE named no recognized transport: {:?}", modes);
    }

    tokio::select! {
        result = wait_all(handles) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping downstream servers and timers");
            heartbeat.shutdown().await;
            supervisor.shutdown().await;
        }
    }
    Ok(())
}

async fn wait_all(handles: Vec<tokio::task::JoinHandle<Result<()>>>) -> Result<()> {
    for handle in handles {
        handle.await??;
    }
    Ok(())
}
