use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, Query, State, WebSocketUpgrade, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use supportbot_config::SupportbotConfig;
use supportbot_protocol::{AiResponseFrame, AiResponseRequest, CALLBACK_PATH, CallbackReply, UserId};

use crate::{error::GatewayError, state::GatewayState, ws::handle_connection};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .route(CALLBACK_PATH, post(callback_handler))
        .route("/api/health", get(health_handler))
        .route("/api/sessions", get(sessions_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Bind, start the heartbeat monitor and serve until ctrl-c.
pub async fn start_gateway(config: &SupportbotConfig) -> anyhow::Result<()> {
    let state = GatewayState::from_config(config);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.gateway_port)
        .parse()
        .context("invalid gateway bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        classifier = %config.services.classifier,
        heartbeat_interval_secs = config.heartbeat.interval_secs,
        "{} listening",
        state.service_name
    );

    serve(listener, state).await
}

/// Serve on an already-bound listener. Returns when the state's shutdown
/// token is cancelled or ctrl-c is received.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<GatewayState>) -> anyhow::Result<()> {
    let monitor = state
        .heartbeat
        .clone()
        .spawn(Arc::clone(&state.registry), state.shutdown.clone());

    let shutdown = state.shutdown.clone();
    let app = build_gateway_app(Arc::clone(&state));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {},
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                shutdown.cancel();
            },
        }
    })
    .await
    .context("gateway server failed")?;

    state.registry.close_all().await;
    let _ = monitor.await;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WsParams {
    uid: Option<String>,
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let Some(user_id) = params
        .uid
        .as_deref()
        .and_then(|s| s.trim().parse::<UserId>().ok())
    else {
        warn!(uid = ?params.uid, %addr, "rejecting websocket upgrade without a valid uid");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid uid" })),
        )
            .into_response();
    };
    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id, Some(addr)))
}

async fn callback_handler(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<AiResponseRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "rejecting malformed callback");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "invalid request" })),
            )
                .into_response();
        },
    };

    let frame = AiResponseFrame::new(req.content, state.assistant_name.as_str());
    match state.registry.send_json(req.user_id, &frame).await {
        Ok(()) => {
            info!(user_id = req.user_id, source = %req.source, "ai response delivered");
            (
                StatusCode::OK,
                Json(CallbackReply {
                    success: true,
                    message: "message sent".into(),
                }),
            )
                .into_response()
        },
        Err(e) => {
            let message = match e {
                GatewayError::UserOffline(_) => "user offline".to_string(),
                other => other.to_string(),
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallbackReply {
                    success: false,
                    message,
                }),
            )
                .into_response()
        },
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "UP",
        "service": state.service_name,
        "online_users": state.registry.count().await,
        "uptime_secs": state.uptime_secs(),
    }))
}

async fn sessions_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.registry.snapshot().await)
}
