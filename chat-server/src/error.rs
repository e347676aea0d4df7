use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chat_shared::ChatAnswer;
use std::time::Duration;
use thiserror::Error;

pub const MISSING_KEY_MESSAGE: &str =
    "❌ Error: OpenAI API key not configured. Please add OPENAI_API_KEY to your .env file";

#[derive(Debug, Error)]
pub enum ChatError {
    /// No credential configured. The service keeps running in degraded mode.
    #[error("{}", MISSING_KEY_MESSAGE)]
    Configuration,

    /// The completion API failed, timed out or answered with a non-success status.
    #[error("{0}")]
    Upstream(String),

    /// The `context` form field was not a JSON array of turns.
    #[error("Malformed conversation history: {0}")]
    MalformedHistory(#[source] serde_json::Error),

    /// Markdown rendering failed. Recovered inside the renderer.
    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

impl ChatError {
    pub fn timed_out(after: Duration) -> Self {
        Self::Upstream(format!(
            "completion API did not respond within {}s",
            after.as_secs_f64()
        ))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // Degraded mode is an answer, not a failure
            Self::Configuration => StatusCode::OK,
            Self::Upstream(_) | Self::MalformedHistory(_) | Self::Format(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown to the user in place of a model answer.
    pub fn answer(&self) -> String {
        match self {
            Self::Configuration => MISSING_KEY_MESSAGE.to_string(),
            other => format!("Error: {other}"),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Upstream(format!("completion API request timed out: {e}"))
        } else {
            Self::Upstream(format!("completion API request failed: {e}"))
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ChatAnswer::new(self.answer()))).into_response()
    }
}
