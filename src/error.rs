use crate::models::CommonResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// 分析流程中调用方可见的失败
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 输入不合法（为空、过长、请求格式错误），调用方可自行修正
    #[error("{0}")]
    Validation(String),

    /// 外部 AI 调用未完成（网络、鉴权、配额、超时、空响应）
    #[error("Failed to analyze code: {0}")]
    ExternalService(String),

    /// 分析已完成但未能保存，结果被丢弃
    #[error("Failed to save analysis: {0}")]
    Persistence(String),

    /// 读取历史列表时数据库出错
    #[error("Failed to retrieve analysis history: {0}")]
    History(String),

    /// 读取单条记录时数据库出错
    #[error("Failed to retrieve analysis: {0}")]
    Storage(String),

    #[error("Analysis not found")]
    NotFound,
}

impl AnalysisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalysisError::NotFound => StatusCode::NOT_FOUND,
            AnalysisError::ExternalService(_)
            | AnalysisError::Persistence(_)
            | AnalysisError::History(_)
            | AnalysisError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 不含内部细节的对外消息
    pub fn generic_message(&self) -> &'static str {
        match self {
            AnalysisError::Validation(_) => "Invalid request",
            AnalysisError::ExternalService(_) => "Failed to analyze code",
            AnalysisError::Persistence(_) => "Failed to save analysis",
            AnalysisError::History(_) => "Failed to retrieve analysis history",
            AnalysisError::Storage(_) => "Failed to retrieve analysis",
            AnalysisError::NotFound => "Analysis not found",
        }
    }
}

/// HTTP 层错误：带上是否回显内部细节的开关
#[derive(Debug)]
pub struct ApiError {
    pub error: AnalysisError,
    pub expose_details: bool,
}

impl ApiError {
    pub fn new(error: AnalysisError, expose_details: bool) -> Self {
        Self {
            error,
            expose_details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        // 校验错误与 404 本身就是给调用方看的，始终原样返回
        let message = match &self.error {
            AnalysisError::Validation(_) | AnalysisError::NotFound => self.error.to_string(),
            _ if self.expose_details => self.error.to_string(),
            _ => self.error.generic_message().to_string(),
        };

        if status.is_server_error() {
            log::error!("Request failed: {}", self.error);
        } else {
            log::warn!("Request rejected: {}", self.error);
        }

        let body = CommonResponse::error(status.as_u16(), message);
        (status, Json(body)).into_response()
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
