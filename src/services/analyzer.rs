use crate::error::{AnalysisError, AnalysisResult};
use crate::models::AnalysisReport;
use crate::security::{build_analysis_prompt, ResponseNormalizer};
use crate::services::gemini::{GenerationParams, TextModel};
use std::sync::Arc;
use std::time::Duration;

/// 负责一次完整的模型调用：构建提示词、调用模型、规范化输出
pub struct AnalysisClient {
    model: Arc<dyn TextModel>,
    normalizer: ResponseNormalizer,
    params: GenerationParams,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(model: Arc<dyn TextModel>, params: GenerationParams, timeout: Duration) -> Self {
        Self {
            model,
            normalizer: ResponseNormalizer::new(),
            params,
            timeout,
        }
    }

    /// 分析代码；只会因外部调用失败或超时返回错误，模型输出格式问题由规范化兜底
    pub async fn analyze(&self, code: &str) -> AnalysisResult<AnalysisReport> {
        let prompt = build_analysis_prompt(code);

        let raw = match tokio::time::timeout(self.timeout, self.model.generate(&prompt, &self.params)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::error!("Error analyzing code with model: {:#}", e);
                return Err(AnalysisError::ExternalService(format!("{:#}", e)));
            }
            Err(_) => {
                log::error!("Model call timed out after {:?}", self.timeout);
                return Err(AnalysisError::ExternalService(format!(
                    "model call timed out after {}s",
                    self.timeout.as_secs_f32()
                )));
            }
        };

        log::debug!("Model returned {} characters", raw.len());
        Ok(self.normalizer.normalize(&raw, code))
    }
}
