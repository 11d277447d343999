use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    serde::Deserialize,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use {supportbot_config::SupportbotConfig, supportbot_protocol::UserId};

use crate::classifier::Classifier;

#[derive(Clone)]
struct AppState {
    classifier: Arc<Classifier>,
    service_name: Arc<str>,
}

pub fn build_classifier_app(classifier: Arc<Classifier>, service_name: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/api/classify", get(classify_handler))
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState {
            classifier,
            service_name: service_name.into(),
        })
}

/// Start the classification service. Fails without a usable LLM provider.
pub async fn start_classifier(config: &SupportbotConfig) -> anyhow::Result<()> {
    let provider = supportbot_agents::providers::from_config(&config.llm)
        .context("classifier needs an LLM provider")?;
    let classifier = Arc::new(Classifier::new(provider, config));
    let service_name = format!("{}-classifier", config.server.name);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.classifier_port)
        .parse()
        .context("invalid classifier bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, categories = config.categories.0.len(), "{service_name} listening");

    axum::serve(listener, build_classifier_app(classifier, &service_name))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("classifier server failed")
}

#[derive(Debug, Deserialize)]
struct ClassifyParams {
    question: Option<String>,
    uid: Option<String>,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

async fn classify_handler(
    State(state): State<AppState>,
    Query(params): Query<ClassifyParams>,
) -> Response {
    let (Some(question), Some(uid)) = (
        params.question.filter(|q| !q.trim().is_empty()),
        params.uid.filter(|u| !u.is_empty()),
    ) else {
        return bad_request("question and uid are required");
    };
    let Ok(uid) = uid.trim().parse::<UserId>() else {
        return bad_request("invalid uid");
    };

    info!(uid, "classification requested");
    Json(state.classifier.classify_and_route(uid, &question).await).into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "UP",
        "service": &*state.service_name,
    }))
}
