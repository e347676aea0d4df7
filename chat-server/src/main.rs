use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chat_server::config::Config;
use chat_server::llm::LlmService;
use chat_server::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let llm = LlmService::new(&config)?;
    info!("Using OpenAI model: {}", llm.model());
    if !config.static_dir.join("index.html").is_file() {
        info!(
            "No index.html under {}, the chat page will not be served",
            config.static_dir.display()
        );
    }

    let state = Arc::new(AppState { llm });
    let app = routes::build_router(state, &config.static_dir)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
