use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::markup::DEFAULT_HEADING_MAX_CHARS;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Process-wide settings, resolved once at startup and handed to the router.
#[derive(Clone)]
pub struct Config {
    /// `None` puts the service in degraded mode: every chat gets the
    /// "not configured" answer instead of a remote call.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub heading_max_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            heading_max_chars: DEFAULT_HEADING_MAX_CHARS,
        }
    }
}

impl Config {
    /// Loads `.env` (if any) and reads settings from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let api_key = lookup("OPENAI_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        match &api_key {
            Some(key) if key.starts_with("sk-") => info!("OpenAI API key loaded successfully"),
            Some(_) => warn!("OPENAI_API_KEY doesn't start with 'sk-'. Please check your .env file"),
            None => {
                warn!("OPENAI_API_KEY not found. Please create .env file with: OPENAI_API_KEY=your_key_here");
                warn!("The server will start but chat won't work without the key");
            }
        }

        let model = lookup("OPENAI_MODEL")
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(defaults.model);
        let base_url = lookup("OPENAI_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.base_url);

        let bind_addr = lookup("CHAT_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("CHAT_BIND_ADDR must be a socket address like 127.0.0.1:8000")?;
        let static_dir = lookup("CHAT_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);
        let heading_max_chars = match lookup("CHAT_HEADING_MAX_CHARS") {
            Some(value) => value
                .trim()
                .parse()
                .context("CHAT_HEADING_MAX_CHARS must be a non-negative integer")?,
            None => defaults.heading_max_chars,
        };

        Ok(Self {
            api_key,
            model,
            base_url,
            bind_addr,
            static_dir,
            heading_max_chars,
            ..defaults
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}
