use anyhow::Result;
use orchestrator_core::{
    agent_manager::AgentManager,
    api::ApiServer,
    config::Config,
    coordinator::{self, Coordinator},
    gateway::Gateway,
    monitoring::OrchestratorMetrics,
    scheduler::Scheduler,
    workflow_engine::WorkflowEngine,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("starting orchestrator core");

    let coordinator = Coordinator::new(config.coordinator.clone());
    let agent_manager = AgentManager::new(coordinator.clone(), config.agent_manager.clone());
    coordinator.set_dispatcher(agent_manager.clone()).await;

    let workflow_engine = WorkflowEngine::new(coordinator.clone());
    let scheduler = Scheduler::new(coordinator.clone(), workflow_engine.clone());
    let gateway = Gateway::new(coordinator.clone(), agent_manager.clone(), config.api.clone());
    let metrics = OrchestratorMetrics::new(coordinator.clone(), agent_manager.clone());

    let api_server = ApiServer::new(
        config.clone(),
        coordinator.clone(),
        agent_manager.clone(),
        workflow_engine.clone(),
        scheduler.clone(),
        metrics.clone(),
    )?;

    let gateway_router = axum::Router::new()
        .route("/ws", axum::routing::get(Gateway::handle_upgrade))
        .with_state(gateway.clone());
    let router = api_server.build_router().merge(gateway_router);

    let matcher = tokio::spawn(coordinator.clone().run_matcher());
    let sweeper = tokio::spawn(coordinator::sweeper::run(
        coordinator.clone(),
        config.coordinator.timeout_sweep_interval,
    ));
    let health_checks = agent_manager.clone().run_health_checks();
    let engine = tokio::spawn(workflow_engine.clone().run());
    let scheduler_loop = tokio::spawn(scheduler.clone().run());
    let gateway_fanout = tokio::spawn(gateway.clone().run_event_fanout());
    let sampler = tokio::spawn(
        metrics
            .clone()
            .run_sampler(std::time::Duration::from_secs(10)),
    );

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.transport.host, config.transport.port_primary
    ))
    .await?;
    info!(
        "listening on {}:{}",
        config.transport.host, config.transport.port_primary
    );

    tokio::select! {
        result = axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!("API server failed: {e}");
            }
        }
        _ = matcher => tracing::error!("matching pass loop exited unexpectedly"),
        _ = sweeper => tracing::error!("timeout sweeper exited unexpectedly"),
        _ = engine => tracing::error!("workflow engine exited unexpectedly"),
        _ = scheduler_loop => tracing::error!("scheduler exited unexpectedly"),
        _ = sampler => tracing::error!("metrics sampler exited unexpectedly"),
        _ = gateway_fanout => tracing::error!("gateway event fan-out exited unexpectedly"),
    }

    coordinator.shutdown();
    for handle in health_checks {
        handle.abort();
    }

    Ok(())
}
