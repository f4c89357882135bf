use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::{
    agent_manager::AgentManager,
    auth::{auth_middleware, create_auth_state},
    config::{ApiConfig, Config},
    coordinator::Coordinator,
    error::OrchestratorError,
    models::{
        Agent, AgentRegistration, AgentStatus, Schedule, ScheduleSubmission, Task, TaskStatus,
        TaskSubmission, Workflow, WorkflowSubmission,
    },
    monitoring::OrchestratorMetrics,
    rate_limit::{rate_limit_middleware, RateLimitConfig},
    scheduler::Scheduler,
    validation::TaskContentValidator,
    workflow_engine::WorkflowEngine,
    Result,
};

const SERVICE_NAME: &str = "orchestrator-core";
const SERVICE_VERSION: &str = "0.1.0";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone)]
pub struct ApiServer {
    config: ApiConfig,
    coordinator: Arc<Coordinator>,
    agent_manager: Arc<AgentManager>,
    workflow_engine: Arc<WorkflowEngine>,
    scheduler: Arc<Scheduler>,
    metrics: Arc<OrchestratorMetrics>,
    validator: Arc<TaskContentValidator>,
    rate_limits: RateLimitConfig,
}

#[derive(Debug, Deserialize)]
pub struct PatchAgentRequest {
    pub status: AgentStatus,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub status: Option<TaskStatus>,
    pub agent_id: Option<String>,
    pub workflow_id: Option<String>,
}

impl ApiServer {
    pub fn new(
        config: Config,
        coordinator: Arc<Coordinator>,
        agent_manager: Arc<AgentManager>,
        workflow_engine: Arc<WorkflowEngine>,
        scheduler: Arc<Scheduler>,
        metrics: Arc<OrchestratorMetrics>,
    ) -> Result<Self> {
        let validator = Arc::new(TaskContentValidator::new()?);
        Ok(Self {
            config: config.api,
            coordinator,
            agent_manager,
            workflow_engine,
            scheduler,
            metrics,
            validator,
            rate_limits: RateLimitConfig::new(),
        })
    }

    /// Layering order: rate limit -> auth -> trace -> CORS, same as the
    /// teacher's `build_router`.
    pub fn build_router(&self) -> Router {
        let auth_state = create_auth_state(self.config.clone());

        let cors_layer = CorsLayer::new()
            .allow_origin(
                self.config
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                axum::http::HeaderName::from_static("x-api-key"),
            ])
            .max_age(std::time::Duration::from_secs(3600));

        Router::new()
            .route("/agents", post(create_agent).get(list_agents))
            .route(
                "/agents/{id}",
                get(get_agent).patch(patch_agent).delete(delete_agent),
            )
            .route("/tasks", post(create_task).get(list_tasks))
            .route("/tasks/{id}", get(get_task))
            .route("/tasks/{id}/cancel", post(cancel_task))
            .route("/workflows", post(create_workflow).get(list_workflows))
            .route("/workflows/{id}", get(get_workflow))
            .route("/workflows/{id}/execute", post(execute_workflow))
            .route("/schedules", post(create_schedule).get(list_schedules))
            .route("/schedules/{id}", delete(delete_schedule))
            .route("/health", get(health_check))
            .route("/metrics", get(get_metrics))
            .route("/system/status", get(get_system_status))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(
                        self.rate_limits.clone(),
                        rate_limit_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer),
            )
            .with_state(self.clone())
    }
}

fn map_error(e: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidState(_) | OrchestratorError::Invalid(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
        OrchestratorError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        OrchestratorError::AgentLost(_) => StatusCode::CONFLICT,
        OrchestratorError::Transport(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::Config(_)
        | OrchestratorError::Serialization(_)
        | OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
    }))
}

async fn get_metrics(
    State(server): State<ApiServer>,
) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = server.metrics.snapshot().await;
    serde_json::to_value(snapshot)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn get_system_status(State(server): State<ApiServer>) -> Json<serde_json::Value> {
    let agents = server.coordinator.list_agents().await;
    let tasks = server.coordinator.list_tasks(None, None, None).await;
    let pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
    let running = tasks.iter().filter(|t| t.status == TaskStatus::Running).count();

    Json(serde_json::json!({
        "agents_connected": agents.len(),
        "tasks_pending": pending,
        "tasks_running": running,
        "tasks_total": tasks.len(),
    }))
}

async fn create_agent(
    State(server): State<ApiServer>,
    Json(registration): Json<AgentRegistration>,
) -> std::result::Result<(StatusCode, Json<Agent>), (StatusCode, Json<ErrorResponse>)> {
    let agent = server.coordinator.register_agent(registration).await;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(State(server): State<ApiServer>) -> Json<Vec<Agent>> {
    Json(server.coordinator.list_agents().await)
}

async fn get_agent(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Agent>, (StatusCode, Json<ErrorResponse>)> {
    server
        .coordinator
        .get_agent(&id)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn patch_agent(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
    Json(request): Json<PatchAgentRequest>,
) -> std::result::Result<Json<Agent>, (StatusCode, Json<ErrorResponse>)> {
    server
        .coordinator
        .update_agent_status(&id, request.status)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn delete_agent(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> StatusCode {
    server.agent_manager.remove_connection(&id).await;
    server.coordinator.unregister_agent(&id).await;
    StatusCode::NO_CONTENT
}

async fn create_task(
    State(server): State<ApiServer>,
    Json(mut submission): Json<TaskSubmission>,
) -> std::result::Result<(StatusCode, Json<Task>), (StatusCode, Json<ErrorResponse>)> {
    if let Err(e) = server.validator.validate_payload(&submission.payload) {
        warn!("task payload validation failed: {e}");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: e.to_string() }),
        ));
    }
    if let Err(e) = server.validator.validate_task_type(&submission.task_type) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: e.to_string() }),
        ));
    }
    submission.workflow_id = None;
    submission.step_index = None;

    server
        .coordinator
        .submit_task(submission)
        .await
        .map(|task| (StatusCode::CREATED, Json(task)))
        .map_err(map_error)
}

async fn list_tasks(
    State(server): State<ApiServer>,
    Query(params): Query<TaskQueryParams>,
) -> Json<Vec<Task>> {
    Json(
        server
            .coordinator
            .list_tasks(params.status, params.agent_id.as_deref(), params.workflow_id.as_deref())
            .await,
    )
}

async fn get_task(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Task>, (StatusCode, Json<ErrorResponse>)> {
    server.coordinator.get_task(&id).await.map(Json).map_err(map_error)
}

async fn cancel_task(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Task>, (StatusCode, Json<ErrorResponse>)> {
    server.coordinator.cancel_task(&id).await.map(Json).map_err(map_error)
}

async fn create_workflow(
    State(server): State<ApiServer>,
    Json(submission): Json<WorkflowSubmission>,
) -> std::result::Result<(StatusCode, Json<Workflow>), (StatusCode, Json<ErrorResponse>)> {
    server
        .coordinator
        .submit_workflow(submission)
        .await
        .map(|workflow| (StatusCode::CREATED, Json(workflow)))
        .map_err(map_error)
}

async fn list_workflows(State(server): State<ApiServer>) -> Json<Vec<Workflow>> {
    Json(server.coordinator.list_workflows().await)
}

async fn get_workflow(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Workflow>, (StatusCode, Json<ErrorResponse>)> {
    server
        .coordinator
        .get_workflow(&id)
        .await
        .map(Json)
        .map_err(map_error)
}

async fn execute_workflow(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    server
        .workflow_engine
        .execute(&id)
        .await
        .map(|_| StatusCode::ACCEPTED)
        .map_err(map_error)
}

async fn create_schedule(
    State(server): State<ApiServer>,
    Json(submission): Json<ScheduleSubmission>,
) -> std::result::Result<(StatusCode, Json<Schedule>), (StatusCode, Json<ErrorResponse>)> {
    server
        .scheduler
        .create_schedule(submission)
        .await
        .map(|schedule| (StatusCode::CREATED, Json(schedule)))
        .map_err(map_error)
}

async fn list_schedules(State(server): State<ApiServer>) -> Json<Vec<Schedule>> {
    Json(server.scheduler.list_schedules().await)
}

async fn delete_schedule(
    State(server): State<ApiServer>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    server
        .scheduler
        .delete_schedule(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(map_error)
}
