use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chat_shared::{ChatAnswer, ChatMessage};
use futures_util::stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

use crate::error::ChatError;
use crate::llm::LlmService;

/// Shared state handed to every route handler.
pub struct AppState {
    pub llm: LlmService,
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    pub message: String,
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_streaming")]
    pub streaming: String,
}

fn default_streaming() -> String {
    "false".to_string()
}

pub fn build_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// POST /chat - answer one message, either as JSON or as a plain-text stream.
async fn chat(State(state): State<Arc<AppState>>, Form(form): Form<ChatForm>) -> Response {
    let streaming = form.streaming.trim().eq_ignore_ascii_case("true");
    info!(
        "Chat request - streaming: {}, message: {}...",
        streaming,
        preview(&form.message)
    );

    let history = match parse_history(&form.context) {
        Ok(history) => history,
        Err(e) => {
            error!("Chat error: {}", e);
            return e.into_response();
        }
    };

    if streaming {
        let fragments = state.llm.stream_chat(history, &form.message);
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(fragment_stream(fragments)),
        )
            .into_response()
    } else {
        match state.llm.complete(history, &form.message).await {
            Ok(answer) => Json(ChatAnswer::new(answer)).into_response(),
            Err(e) => {
                error!("Chat error: {}", e);
                e.into_response()
            }
        }
    }
}

fn parse_history(context: &str) -> Result<Vec<ChatMessage>, ChatError> {
    if context.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(context).map_err(ChatError::MalformedHistory)
}

// Dropping this stream (client disconnect) drops the receiver, which stops
// the relay task on its next send.
fn fragment_stream(
    rx: mpsc::Receiver<String>,
) -> impl futures_util::Stream<Item = Result<String, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|fragment| (Ok(fragment), rx))
    })
}

fn preview(message: &str) -> String {
    message.chars().take(50).collect()
}
