pub mod analyze;
pub mod health;

use crate::error::{AnalysisError, ApiError};
use crate::models::CommonResponse;
use crate::services::AnalysisService;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::sync::Arc;

/// 所有处理函数共享的状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(service: Arc<AnalysisService>, expose_error_details: bool) -> Self {
        Self {
            service,
            expose_error_details,
        }
    }

    pub(crate) fn error(&self, error: AnalysisError) -> ApiError {
        ApiError::new(error, self.expose_error_details)
    }

    /// 提取器拒绝（JSON、查询参数、路径格式错误）统一按校验错误处理
    pub(crate) fn reject(&self, message: impl Into<String>) -> ApiError {
        self.error(AnalysisError::Validation(message.into()))
    }
}

/// 组装完整路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(analyze::routes())
        .merge(health::routes())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    let body = CommonResponse::error(StatusCode::NOT_FOUND.as_u16(), "Not Found");
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
