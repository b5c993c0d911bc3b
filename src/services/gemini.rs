use crate::config::GeminiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// 生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&GeminiConfig> for GenerationParams {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
        }
    }
}

/// 外部文本生成模型：输入提示词，返回原始文本
///
/// 返回 `Err` 表示调用本身没有完成（网络、鉴权、配额、无候选结果等），
/// 与"返回了文本但格式不对"是两回事。
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Google Gemini `generateContent` REST 客户端
pub struct GeminiService {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiService {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("codeshield/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn extract_text(payload: GenerateContentResponse) -> Result<String> {
        if payload.candidates.is_empty() {
            if let Some(reason) = payload.prompt_feedback.and_then(|f| f.block_reason) {
                anyhow::bail!("Gemini blocked the prompt: {}", reason);
            }
            anyhow::bail!("Gemini returned no candidates");
        }

        let candidate = &payload.candidates[0];
        let texts: Vec<&str> = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if texts.is_empty() {
            anyhow::bail!(
                "Gemini returned a candidate without text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
        }

        Ok(texts.concat())
    }
}

#[async_trait]
impl TextModel for GeminiService {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("GEMINI_API_KEY is not set");
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            anyhow::bail!("Gemini API returned {}: {}", status, message.trim());
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to decode Gemini response")?;

        let text = Self::extract_text(payload)?;
        log::info!("Gemini analysis completed ({} characters)", text.len());
        Ok(text)
    }
}
