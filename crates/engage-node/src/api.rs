use crate::api_sse;
use crate::config::ApiConfig;
use crate::node::{EngageNode, NodeStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use engage_engine::TaskView;
use engage_types::{
    AttemptId, AttemptState, EngageError, RewardAmount, SignalSnapshot, TaskDefinition, TaskId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct AppState {
    pub node: EngageNode,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    /// Machine-readable code the UI routes remedial action on.
    code: String,
}

#[derive(Deserialize)]
struct UserQuery {
    user: String,
}

#[derive(Serialize, Deserialize)]
struct StartRequest {
    user: String,
}

#[derive(Serialize, Deserialize)]
struct StartResponse {
    attempt_id: String,
    task_id: TaskId,
    state: AttemptState,
    attempt_index: u32,
}

#[derive(Serialize, Deserialize)]
struct SignalRequest {
    user: String,
    snapshot: SignalSnapshot,
}

#[derive(Serialize, Deserialize)]
struct SignalResponse {
    attempt_id: String,
    signals: SignalSnapshot,
}

#[derive(Serialize, Deserialize)]
struct SubmitRequest {
    user: String,
    snapshot: SignalSnapshot,
    #[serde(default)]
    proof: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SubmitResponse {
    accepted: bool,
    pending_review: bool,
    reason: Option<String>,
    reward_granted: Option<RewardAmount>,
}

pub fn start_api_server(node: EngageNode, config: &ApiConfig) -> JoinHandle<()> {
    let app = build_router(node);
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind API server");
        axum::serve(listener, app).await.expect("API server failed");
    })
}

pub fn build_router(node: EngageNode) -> Router {
    let state = Arc::new(AppState { node });
    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/v1/tasks", get(list_tasks))
        .route("/v1/tasks/:id/start", post(start_task))
        .route("/v1/attempts/:id/signal", post(report_signal))
        .route("/v1/attempts/:id/submit", post(submit_attempt))
        .route("/v1/admin/tasks", post(create_task))
        .route("/v1/events", get(api_sse::sse_handler))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

fn error_response(e: EngageError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        EngageError::RegionBlocked { .. }
        | EngageError::ReferralRequired
        | EngageError::AccessDisabled => StatusCode::FORBIDDEN,
        EngageError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        EngageError::AttemptNotFound(_) | EngageError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        EngageError::AttemptExpired => StatusCode::GONE,
        EngageError::InsufficientSignal(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngageError::AttemptsExhausted | EngageError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        EngageError::Storage(_) | EngageError::Serialization(_) | EngageError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

fn parse_attempt_id(id: &str) -> Result<AttemptId, (StatusCode, Json<ErrorResponse>)> {
    AttemptId::from_hex(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid attempt id: {}", id),
                code: "invalid-attempt-id".to_string(),
            }),
        )
    })
}

async fn health() -> &'static str {
    "OK"
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<NodeStats>, StatusCode> {
    match state.node.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<TaskView>>, (StatusCode, Json<ErrorResponse>)> {
    let user = UserId::new(query.user);
    state
        .node
        .list_tasks(&user)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = UserId::new(req.user);
    let attempt = state
        .node
        .start_task(&user, &TaskId::new(task_id))
        .await
        .map_err(error_response)?;

    Ok(Json(StartResponse {
        attempt_id: attempt.id.to_hex(),
        task_id: attempt.task_id,
        state: attempt.state,
        attempt_index: attempt.index,
    }))
}

async fn report_signal(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Json(req): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, (StatusCode, Json<ErrorResponse>)> {
    let attempt_id = parse_attempt_id(&attempt_id)?;
    let user = UserId::new(req.user);
    let attempt = state
        .node
        .report_signal(attempt_id, &user, req.snapshot)
        .await
        .map_err(error_response)?;

    Ok(Json(SignalResponse {
        attempt_id: attempt.id.to_hex(),
        signals: attempt.signals,
    }))
}

async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorResponse>)> {
    let attempt_id = parse_attempt_id(&attempt_id)?;
    let user = UserId::new(req.user);

    match state
        .node
        .submit_attempt(attempt_id, &user, req.snapshot, req.proof)
        .await
    {
        Ok(outcome) => Ok(Json(SubmitResponse {
            accepted: outcome.accepted,
            pending_review: outcome.pending_review,
            reason: None,
            reward_granted: outcome.reward_granted,
        })),
        // Rejections the client can act on come back in the submit shape
        // with the reason code, not as transport failures.
        Err(
            e @ (EngageError::InsufficientSignal(_)
            | EngageError::QuotaExceeded
            | EngageError::AttemptExpired),
        ) => Ok(Json(SubmitResponse {
            accepted: false,
            pending_review: false,
            reason: Some(e.code().to_string()),
            reward_granted: None,
        })),
        Err(e) => Err(error_response(e)),
    }
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(task): Json<TaskDefinition>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .node
        .create_task(task)
        .await
        .map(|_| StatusCode::CREATED)
        .map_err(error_response)
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    Ok(state.node.metrics().gather())
}
