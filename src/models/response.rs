use serde::{Deserialize, Serialize};

/// 所有 `/api/v1` 接口与错误响应共用的信封结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonResponse<T> {
    pub code: u16,
    pub message: String,
    pub message_id: String,
    pub data: T,
}

impl<T> CommonResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 200,
            message: message.into(),
            message_id: "0".to_string(),
            data,
        }
    }
}

impl CommonResponse<serde_json::Value> {
    /// 错误信封，data 固定为空对象
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            message_id: "0".to_string(),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// `POST /analyze` 请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub code: String,
}

/// 历史查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub database: String,
}
