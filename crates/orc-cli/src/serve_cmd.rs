//! HTTP front end for the orchestration pipeline (`orc serve`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use orc_core::checkpoint::Checkpointer;
use orc_core::driver::{Driver, TurnOutcome};
use orc_core::gateway::{Gateway, GatewayOutcome};
use orc_core::llm::EchoLlmService;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::pipeline::build_driver;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub thread_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub messages: Vec<MessageView>,
    pub suspended: bool,
    pub pending_approval: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    driver: Arc<Driver>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(checkpointer: Arc<dyn Checkpointer>) -> Router {
    let llm = Arc::new(EchoLlmService);
    let gateway = Arc::new(Gateway::new(checkpointer, llm.clone()));
    let driver = Arc::new(build_driver(llm));

    Router::new()
        .route("/", get(index))
        .route("/api/messages", post(post_message))
        .layer(CorsLayer::permissive())
        .with_state(AppState { gateway, driver })
}

pub async fn run_serve(checkpointer: Arc<dyn Checkpointer>, bind: &str, port: u16) -> Result<()> {
    let app = build_router(checkpointer);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("orc serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("orc serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> impl IntoResponse {
    Html(
        "<!DOCTYPE html><html><head><title>orc</title></head><body>\
<h1>orc</h1><p>POST a thread_id and message to /api/messages.</p>\
</body></html>",
    )
}

async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let result = state.gateway.process_message(&req.thread_id, &req.message).await;

    let outcome = match result.outcome {
        GatewayOutcome::AgentState(agent_state) => {
            state.driver.run_turn(agent_state).await.map_err(AppError::internal)?
        }
        GatewayOutcome::Resume(resume) => {
            let agent_state = state.gateway.state_for_resume(&req.thread_id).await;
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            state
                .driver
                .resume_turn(agent_state, resume, orc_core::capability::StatusSink::new(tx))
                .await
                .map_err(AppError::internal)?
        }
        GatewayOutcome::ControlOnly(agent_state) => {
            state.gateway.save(&req.thread_id, &agent_state, None).await;
            return Ok(Json(MessageResponse {
                messages: agent_state
                    .messages
                    .iter()
                    .map(|m| MessageView {
                        role: format!("{:?}", m.role).to_lowercase(),
                        content: m.content.clone(),
                    })
                    .collect(),
                suspended: false,
                pending_approval: None,
            }));
        }
    };

    let response = match &outcome {
        TurnOutcome::Finished(agent_state) => {
            state.gateway.save(&req.thread_id, agent_state, None).await;
            MessageResponse {
                messages: agent_state
                    .messages
                    .iter()
                    .map(|m| MessageView {
                        role: format!("{:?}", m.role).to_lowercase(),
                        content: m.content.clone(),
                    })
                    .collect(),
                suspended: false,
                pending_approval: None,
            }
        }
        TurnOutcome::Suspended { state: agent_state, interrupt } => {
            state
                .gateway
                .save(&req.thread_id, agent_state, Some(interrupt.clone()))
                .await;
            MessageResponse {
                messages: agent_state
                    .messages
                    .iter()
                    .map(|m| MessageView {
                        role: format!("{:?}", m.role).to_lowercase(),
                        content: m.content.clone(),
                    })
                    .collect(),
                suspended: true,
                pending_approval: Some(interrupt.payload.clone()),
            }
        }
    };

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
