use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisRecord, AnalysisReport, AnalysisSummary};
use crate::services::analyzer::AnalysisClient;
use crate::services::database::AnalysisStore;
use anyhow::Context;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// 单次分析请求的编排：校验 -> 模型分析 -> 原子落库 -> 返回
pub struct AnalysisService {
    client: AnalysisClient,
    store: Arc<dyn AnalysisStore>,
    max_code_length: usize,
}

impl AnalysisService {
    pub fn new(client: AnalysisClient, store: Arc<dyn AnalysisStore>, max_code_length: usize) -> Self {
        Self {
            client,
            store,
            max_code_length,
        }
    }

    /// 在任何外部调用之前校验输入
    pub fn validate(&self, code: &str) -> AnalysisResult<()> {
        if code.is_empty() {
            return Err(AnalysisError::Validation("code: must not be empty".to_string()));
        }

        let length = code.chars().count();
        if length > self.max_code_length {
            return Err(AnalysisError::Validation(format!(
                "Code exceeds maximum length of {} characters (got {})",
                self.max_code_length, length
            )));
        }

        Ok(())
    }

    /// 分析并保存；保存失败时整个请求失败，已得到的分析结果被丢弃
    pub async fn analyze(&self, code: &str) -> AnalysisResult<AnalysisReport> {
        self.validate(code)?;
        log::info!("Analyzing code (length: {} characters)", code.chars().count());

        let report = self.client.analyze(code).await?;

        let record = AnalysisRecord::new(code, &report);
        let analysis_id = record.analysis_id;
        self.with_store(move |store| store.save_analysis(&record))
            .await
            .map_err(|e| {
                log::error!("Failed to persist analysis {}: {:#}", analysis_id, e);
                AnalysisError::Persistence(format!("{:#}", e))
            })?;

        log::info!(
            "Analysis completed and saved (ID: {}, risk: {}, vulnerabilities: {})",
            analysis_id,
            report.risk_score,
            report.vulnerabilities.len()
        );

        Ok(report)
    }

    /// 分页获取历史，按创建时间倒序
    pub async fn list_history(&self, limit: Option<u32>, offset: Option<u32>) -> AnalysisResult<Vec<AnalysisSummary>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0);

        self.with_store(move |store| store.list_analyses(limit, offset))
            .await
            .map_err(|e| AnalysisError::History(format!("{:#}", e)))
    }

    pub async fn get_by_id(&self, analysis_id: Uuid) -> AnalysisResult<AnalysisRecord> {
        self.with_store(move |store| store.get_analysis(&analysis_id))
            .await
            .map_err(|e| AnalysisError::Storage(format!("{:#}", e)))?
            .ok_or(AnalysisError::NotFound)
    }

    /// 删除分析及其全部漏洞与修复
    pub async fn delete_by_id(&self, analysis_id: Uuid) -> AnalysisResult<()> {
        let deleted = self
            .with_store(move |store| store.delete_analysis(&analysis_id))
            .await
            .map_err(|e| AnalysisError::Persistence(format!("{:#}", e)))?;

        if !deleted {
            return Err(AnalysisError::NotFound);
        }

        log::info!("Analysis {} deleted", analysis_id);
        Ok(())
    }

    /// 数据库连通性探测，不涉及外部模型
    pub async fn check_database(&self) -> Result<(), String> {
        self.with_store(|store| store.ping())
            .await
            .map_err(|e| format!("{:#}", e))
    }

    /// 存储操作是同步阻塞的，放到阻塞线程池执行
    async fn with_store<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&dyn AnalysisStore) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .context("Storage task failed")?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use crate::services::database::Database;
    use crate::services::gemini::{GenerationParams, TextModel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const CLEAN_REPLY: &str =
        r#"{"vulnerabilities":[],"fixes":[],"risk_score":"Low","explanation":"No issues found."}"#;

    struct CountingModel {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextModel for CountingModel {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl TextModel for FailingModel {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    /// 所有写操作都失败的存储
    struct BrokenStore;

    impl AnalysisStore for BrokenStore {
        fn save_analysis(&self, _record: &AnalysisRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk I/O error")
        }
        fn get_analysis(&self, _analysis_id: &Uuid) -> anyhow::Result<Option<AnalysisRecord>> {
            Ok(None)
        }
        fn list_analyses(&self, _limit: u32, _offset: u32) -> anyhow::Result<Vec<AnalysisSummary>> {
            anyhow::bail!("disk I/O error")
        }
        fn delete_analysis(&self, _analysis_id: &Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
        fn ping(&self) -> anyhow::Result<()> {
            anyhow::bail!("database is locked")
        }
    }

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }

    fn service_with(model: Arc<dyn TextModel>, store: Arc<dyn AnalysisStore>, max: usize) -> AnalysisService {
        let client = AnalysisClient::new(model, params(), Duration::from_secs(5));
        AnalysisService::new(client, store, max)
    }

    #[tokio::test]
    async fn test_oversized_input_never_reaches_model() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model.clone(), db.clone(), 50_000);

        let err = service.analyze(&"a".repeat(60_000)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(db.list_analyses(10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model.clone(), db, 100);

        assert!(matches!(service.analyze("").await, Err(AnalysisError::Validation(_))));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitespace_only_input_is_analyzed() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model.clone(), db.clone(), 100);

        let report = service.analyze("   \n").await.unwrap();
        assert_eq!(report.risk_score, RiskLevel::Low);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let history = db.list_analyses(10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].code_snippet, "   \n");
    }

    #[tokio::test]
    async fn test_limit_counts_characters_not_bytes() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model, db, 4);

        assert!(service.validate("中文代码").is_ok());
        assert!(service.validate("中文代码!").is_err());
    }

    #[tokio::test]
    async fn test_successful_analysis_is_persisted() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model, db.clone(), 50_000);

        let report = service.analyze("def test(): return 'hello'").await.unwrap();
        assert_eq!(report.risk_score, RiskLevel::Low);
        assert!(report.vulnerabilities.is_empty());

        let history = service.list_history(None, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].code_snippet, "def test(): return 'hello'");

        let record = service.get_by_id(history[0].analysis_id).await.unwrap();
        assert_eq!(record.to_report(), report);
    }

    #[tokio::test]
    async fn test_model_failure_persists_nothing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(Arc::new(FailingModel), db.clone(), 50_000);

        let err = service.analyze("x = 1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::ExternalService(_)));
        assert!(db.list_analyses(10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_discards_result() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let service = service_with(model.clone(), Arc::new(BrokenStore), 50_000);

        let err = service.analyze("x = 1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Persistence(ref m) if m.contains("disk I/O error")));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_and_delete_missing_are_not_found() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(Arc::new(FailingModel), db, 50_000);

        assert!(matches!(service.get_by_id(Uuid::new_v4()).await, Err(AnalysisError::NotFound)));
        assert!(matches!(service.delete_by_id(Uuid::new_v4()).await, Err(AnalysisError::NotFound)));
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let model = Arc::new(CountingModel {
            reply: CLEAN_REPLY,
            calls: AtomicUsize::new(0),
        });
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = service_with(model, db, 50_000);

        for i in 0..3 {
            service.analyze(&format!("print({})", i)).await.unwrap();
        }

        assert_eq!(service.list_history(Some(0), None).await.unwrap().len(), 1);
        assert_eq!(service.list_history(Some(1000), None).await.unwrap().len(), 3);
        assert_eq!(service.list_history(Some(10), Some(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_errors_surface() {
        let service = service_with(Arc::new(FailingModel), Arc::new(BrokenStore), 50_000);

        assert!(matches!(service.list_history(None, None).await, Err(AnalysisError::History(_))));
        assert!(matches!(service.get_by_id(Uuid::new_v4()).await, Err(AnalysisError::NotFound)));
        let detail = service.check_database().await.unwrap_err();
        assert!(detail.contains("locked"));
    }
}
