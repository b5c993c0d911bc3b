pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod security;
pub mod services;

use anyhow::Context;
use api::AppState;
use config::AppConfig;
use services::{AnalysisClient, AnalysisService, AnalysisStore, Database, GeminiService, GenerationParams, TextModel};
use std::sync::Arc;

/// 按配置组装服务，模型与存储由调用方注入
pub fn build_service(
    config: &AppConfig,
    model: Arc<dyn TextModel>,
    store: Arc<dyn AnalysisStore>,
) -> AnalysisService {
    let client = AnalysisClient::new(
        model,
        GenerationParams::from(&config.gemini),
        config.gemini.timeout(),
    );
    AnalysisService::new(client, store, config.security.max_code_length)
}

pub fn build_app(
    config: &AppConfig,
    model: Arc<dyn TextModel>,
    store: Arc<dyn AnalysisStore>,
) -> axum::Router {
    let service = Arc::new(build_service(config, model, store));
    api::router(AppState::new(service, config.security.expose_error_details))
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    log::info!(
        "Starting {} v{} ({})",
        config::SERVICE_NAME,
        config::SERVICE_VERSION,
        config.app_env
    );
    for warning in config.validate() {
        log::warn!("{}", warning);
    }

    // 初始化数据库
    let db = Database::new(config.database.path.clone())
        .with_context(|| format!("Failed to open database at {}", config.database.path.display()))?;
    log::info!("Database ready at {}", config.database.path.display());

    // 初始化 Gemini 客户端
    let gemini = GeminiService::new(&config.gemini)?;
    log::info!("Gemini model: {}", config.gemini.model);

    let app = build_app(&config, Arc::new(gemini), Arc::new(db));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    log::info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
