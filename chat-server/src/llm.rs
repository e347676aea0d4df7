use chat_shared::{ChatMessage, MessageRole};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ChatError;
use crate::markup::MarkupRenderer;

const DONE_MARKER: &str = "[DONE]";
const STREAM_BUFFER: usize = 32;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Always use only Markdown for formatting. \
Never use HTML tags or inline styles. \
Do NOT use <span>, <font>, <div>, or style attributes. \
Use only Markdown syntax for headings, lists, code, etc. \
Examples: \n\
- # Heading 1\n\
- ## Heading 2\n\
- **bold** and *italic* text\n\
- `code` and ```code block```\n\
- - lists\n\
- > quotes\n\
- [links](https://example.com)\n\
Never add colors or backgrounds through style attributes!";

const STREAM_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Answer questions based on your knowledge. \
Be informative, accurate, and helpful. IMPORTANT: Always use markdown formatting for better readability. \
Examples of how to format your responses:\n\
- Use **bold text** for emphasis and important points\n\
- Use *italic text* for terms and definitions\n\
- Use `inline code` for code snippets and technical terms\n\
- Use ```\ncode blocks\n``` for longer code examples\n\
- Use bullet points (- item) for lists\n\
- Use ### Headers for organizing content\n\
- Use > for quotes or important notes\n\
Always format your responses with appropriate markdown syntax. \
Never use HTML tags or inline styles.";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Delta(String),
    Done,
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Holds only fixed configuration and a pooled HTTP client, so one instance
/// is shared by every request.
pub struct LlmService {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
    renderer: MarkupRenderer,
}

impl LlmService {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        info!("Initializing LLM service with model: {}", config.model);
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.completions_url(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.timeout,
            renderer: MarkupRenderer::new(config.heading_max_chars),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Asks for one complete answer and returns it rendered as HTML.
    pub async fn complete(
        &self,
        history: Vec<ChatMessage>,
        user_message: &str,
    ) -> Result<String, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::Configuration)?;
        let request = self.request(CHAT_SYSTEM_PROMPT, history, user_message, false);
        info!(
            "Regular chat request - model: {}, messages count: {}",
            self.model,
            request.messages.len()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let completion: CompletionResponse = response.json().await?;
        let raw = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Upstream("completion API returned no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();
        debug!("Raw response from OpenAI: {} chars", raw.len());

        Ok(self.renderer.render(raw.trim()))
    }

    /// Starts a streamed answer and returns the receiving end of its fragments.
    ///
    /// The channel always closes: after the end marker, when the upstream
    /// connection ends, or after a single error fragment. Dropping the
    /// receiver makes the relay task abandon the upstream connection.
    pub fn stream_chat(
        &self,
        history: Vec<ChatMessage>,
        user_message: &str,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let Some(api_key) = self.api_key.as_deref() else {
            // Fresh channel, so there is room for this one fragment
            let _ = tx.try_send(ChatError::Configuration.to_string());
            return rx;
        };

        let request = self.request(STREAM_SYSTEM_PROMPT, history, user_message, true);
        info!(
            "Streaming chat request - model: {}, messages count: {}",
            self.model,
            request.messages.len()
        );
        let call = self.http.post(&self.endpoint).bearer_auth(api_key).json(&request);
        let read_timeout = self.timeout;

        tokio::spawn(async move {
            if let Err(e) = relay_stream(call, read_timeout, &tx).await {
                error!("Streaming error: {}", e);
                let _ = tx.send(format!("❌ Error during streaming: {e}")).await;
            }
        });

        rx
    }

    fn request(
        &self,
        system_prompt: &str,
        history: Vec<ChatMessage>,
        user_message: &str,
        stream: bool,
    ) -> CompletionRequest<'_> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new(MessageRole::System, system_prompt));
        messages.extend(history);
        messages.push(ChatMessage::new(MessageRole::User, user_message));

        CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("OpenAI API error ({}): {}", status, body);
    Err(ChatError::Upstream(format!(
        "completion API returned {status}: {body}"
    )))
}

async fn relay_stream(
    call: reqwest::RequestBuilder,
    read_timeout: Duration,
    tx: &mpsc::Sender<String>,
) -> Result<(), ChatError> {
    let response = timeout(read_timeout, call.send())
        .await
        .map_err(|_| ChatError::timed_out(read_timeout))??;
    let response = ensure_success(response).await?;

    // One record per line; a malformed line never affects its neighbours.
    let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
    let mut lines = StreamReader::new(body).lines();
    loop {
        let next = timeout(read_timeout, lines.next_line())
            .await
            .map_err(|_| ChatError::timed_out(read_timeout))?
            .map_err(|e| ChatError::Upstream(format!("completion stream failed: {e}")))?;
        let Some(line) = next else {
            debug!("Upstream closed the stream without an end marker");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            debug!("Unexpected line format: {}", line);
            continue;
        };

        match parse_event(data) {
            Ok(Some(StreamEvent::Done)) => break,
            Ok(Some(StreamEvent::Delta(text))) => {
                if tx.send(text).await.is_err() {
                    debug!("Client went away, abandoning completion stream");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("JSON decode error: {}, data: {}", e, data),
        }
    }

    Ok(())
}

fn parse_event(data: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_MARKER {
        return Ok(Some(StreamEvent::Done));
    }
    let chunk: CompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map(StreamEvent::Delta))
}
