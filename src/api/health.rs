use crate::api::AppState;
use crate::config::{SERVICE_NAME, SERVICE_VERSION};
use crate::models::HealthStatus;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

/// 服务信息与接口列表
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "status": "running",
        "version": SERVICE_VERSION,
        "endpoints": {
            "analyze": "/analyze",
            "analyze_v1": "/api/v1/analyze",
            "history": "/api/v1/analyze/history",
            "analysis": "/api/v1/analyze/{analysis_id}",
            "health": "/health",
        }
    }))
}

/// 只探测数据库，不调用 AI 模型；始终返回 200
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let (status, database) = match state.service.check_database().await {
        Ok(()) => ("healthy", "connected".to_string()),
        Err(e) => {
            log::error!("Database health check failed: {}", e);
            ("unhealthy", format!("error: {}", e))
        }
    };

    Json(HealthStatus {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        database,
    })
}
