use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    supportbot_config::{SupportbotConfig, WorkerKind},
    supportbot_protocol::WorkerRequest,
};

use crate::{
    assistant::AssistantWorker,
    callback::CallbackClient,
    general_chat::GeneralChatWorker,
    worker::{Worker, spawn_job},
};

// ── Shared app state ─────────────────────────────────────────────────────────

struct JobState<W: ?Sized> {
    worker: Arc<W>,
    callback: CallbackClient,
    service_name: Arc<str>,
}

impl<W: ?Sized> Clone for JobState<W> {
    fn clone(&self) -> Self {
        Self {
            worker: Arc::clone(&self.worker),
            callback: self.callback.clone(),
            service_name: Arc::clone(&self.service_name),
        }
    }
}

fn worker_router<W: Worker>(path: &str) -> Router<JobState<W>> {
    Router::new()
        .route(path, post(job_handler::<W>))
        .route("/api/health", get(health_handler::<W>))
}

fn with_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    router.layer(TraceLayer::new_for_http()).layer(cors)
}

// ── Apps ─────────────────────────────────────────────────────────────────────

pub fn build_assistant_app(
    worker: Arc<AssistantWorker>,
    callback: CallbackClient,
    service_name: &str,
) -> Router {
    let router = worker_router::<AssistantWorker>(WorkerKind::Assistant.path())
        .route("/api/tools", get(tools_handler))
        .with_state(JobState {
            worker,
            callback,
            service_name: service_name.into(),
        });
    with_layers(router)
}

pub fn build_general_chat_app(
    worker: Arc<GeneralChatWorker>,
    callback: CallbackClient,
    service_name: &str,
) -> Router {
    let router =
        worker_router::<GeneralChatWorker>(WorkerKind::GeneralChat.path()).with_state(JobState {
            worker,
            callback,
            service_name: service_name.into(),
        });
    with_layers(router)
}

// ── Startup ──────────────────────────────────────────────────────────────────

pub async fn start_assistant(config: &SupportbotConfig) -> anyhow::Result<()> {
    let provider = supportbot_agents::providers::from_config(&config.llm)
        .context("assistant needs an LLM provider")?;
    let tools = Arc::new(supportbot_tools::builtin_registry()?);
    let worker = Arc::new(AssistantWorker::new(provider, tools, &config.agent));
    let name = format!("{}-assistant", config.server.name);
    let app = build_assistant_app(worker, CallbackClient::new(&config.services.gateway), &name);
    serve(app, config, config.server.assistant_port, &name).await
}

pub async fn start_general_chat(config: &SupportbotConfig) -> anyhow::Result<()> {
    let provider = supportbot_agents::providers::from_config(&config.llm)
        .context("general chat needs an LLM provider")?;
    let worker = Arc::new(GeneralChatWorker::new(provider));
    let name = format!("{}-general-chat", config.server.name);
    let app = build_general_chat_app(worker, CallbackClient::new(&config.services.gateway), &name);
    serve(app, config, config.server.general_chat_port, &name).await
}

async fn serve(app: Router, config: &SupportbotConfig, port: u16, name: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{port}", config.server.bind)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, gateway = %config.services.gateway, "{name} listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .with_context(|| format!("{name} server failed"))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn job_handler<W: Worker>(
    State(state): State<JobState<W>>,
    body: Result<Json<WorkerRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) if !req.question.trim().is_empty() => req,
        Ok(_) => {
            return invalid_request();
        },
        Err(e) => {
            warn!(error = %e, "rejecting malformed job");
            return invalid_request();
        },
    };
    info!(
        user_id = req.user_id,
        category = req.category.as_deref().unwrap_or("-"),
        source = state.worker.source(),
        "job accepted"
    );
    spawn_job(Arc::clone(&state.worker), state.callback.clone(), req);
    Json(serde_json::json!({ "status": "processing" })).into_response()
}

fn invalid_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": "invalid request" })),
    )
        .into_response()
}

async fn health_handler<W: Worker>(State(state): State<JobState<W>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "UP",
        "service": &*state.service_name,
    }))
}

async fn tools_handler(State(state): State<JobState<AssistantWorker>>) -> impl IntoResponse {
    let tools = state.worker.tools().descriptors();
    Json(serde_json::json!({
        "count": tools.len(),
        "tools": tools,
    }))
}
