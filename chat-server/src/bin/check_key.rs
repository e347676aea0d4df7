//! Verifies that the configured OpenAI key works by listing the models it can see.

use async_openai::{config::OpenAIConfig, Client};
use chat_server::config::Config;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let client = Client::with_config(client_config(Config::from_env()?)?);

    match client.models().list().await {
        Ok(models) => {
            println!("Key works. Available models:");
            for model in models.data {
                println!("{}", model.id);
            }
            Ok(())
        }
        Err(e) => {
            error!("Key check failed: {}", e);
            Err(e.into())
        }
    }
}

/// Points the client at the same key and API root the chat server uses.
fn client_config(settings: Config) -> anyhow::Result<OpenAIConfig> {
    let api_key = settings
        .api_key
        .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not found. Please set it in your .env file"))?;
    info!("OPENAI_API_KEY: {}", mask_key(&api_key));

    Ok(OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(settings.base_url))
}

/// Keeps the prefix and the last four characters, enough to tell keys apart.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
