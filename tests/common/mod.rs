#![allow(dead_code)]

use async_trait::async_trait;
use codeshield_lib::config::AppConfig;
use codeshield_lib::services::{AnalysisStore, Database, GenerationParams, TextModel};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const CLEAN_REPLY: &str =
    r#"{"vulnerabilities":[],"fixes":[],"risk_score":"Low","explanation":"No issues found."}"#;

/// 按固定脚本回复的模型，记录调用次数
pub struct ScriptedModel {
    reply: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub model: Arc<ScriptedModel>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::defaults();
    config.gemini.api_key = "test-key".to_string();
    config.gemini.timeout_secs = 5;
    config
}

pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn spawn_with(config: AppConfig, model: ScriptedModel, store: Arc<dyn AnalysisStore>) -> TestServer {
    let model = Arc::new(model);
    let app = codeshield_lib::build_app(&config, model.clone(), store);
    let addr = serve(app).await;

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        model,
    }
}

pub async fn spawn_app(model: ScriptedModel) -> (TestServer, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let server = spawn_with(test_config(), model, db.clone()).await;
    (server, db)
}
