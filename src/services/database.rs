use crate::models::{
    preview_snippet, AnalysisRecord, AnalysisSummary, Fix, FixRecord, RiskLevel, Vulnerability,
    VulnerabilityRecord,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 分析记录的持久化接口
///
/// 实现需要保证 `save_analysis` 的原子性：分析、漏洞、修复三类记录要么全部写入，要么全部不写。
pub trait AnalysisStore: Send + Sync {
    fn save_analysis(&self, record: &AnalysisRecord) -> Result<()>;
    fn get_analysis(&self, analysis_id: &Uuid) -> Result<Option<AnalysisRecord>>;
    fn list_analyses(&self, limit: u32, offset: u32) -> Result<Vec<AnalysisSummary>>;
    fn delete_analysis(&self, analysis_id: &Uuid) -> Result<bool>;
    fn ping(&self) -> Result<()>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// 创建或打开数据库
    pub fn new(db_path: PathBuf) -> Result<Self> {
        // 确保父目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        // 文件库使用 WAL，读请求不阻塞写入
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("Failed to enable WAL")?;

        Self::from_connection(conn)
    }

    /// 内存数据库，主要用于测试
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    /// 初始化数据库架构
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS code_analysis (
                analysis_id TEXT PRIMARY KEY,
                code_snippet TEXT NOT NULL,
                risk_score TEXT NOT NULL CHECK (risk_score IN ('High', 'Medium', 'Low')),
                explanation TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_code_analysis_created_at
                ON code_analysis (created_at DESC);

            CREATE TABLE IF NOT EXISTS vulnerabilities (
                vulnerability_id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL
                    REFERENCES code_analysis(analysis_id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                line INTEGER NOT NULL,
                severity TEXT NOT NULL CHECK (severity IN ('High', 'Medium', 'Low')),
                type TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_vulnerabilities_analysis
                ON vulnerabilities (analysis_id, ordinal);

            CREATE TABLE IF NOT EXISTS fixes (
                fix_id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL
                    REFERENCES code_analysis(analysis_id) ON DELETE CASCADE,
                ordinal INTEGER NOT NULL,
                line INTEGER NOT NULL,
                original TEXT NOT NULL,
                fixed TEXT NOT NULL,
                explanation TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_fixes_analysis
                ON fixes (analysis_id, ordinal);
            "#,
        )
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// 只更新 updated_at
    pub fn touch_analysis(&self, analysis_id: &Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE code_analysis SET updated_at = ?1 WHERE analysis_id = ?2",
            params![format_timestamp(&Utc::now()), analysis_id.to_string()],
        )?;
        Ok(updated > 0)
    }

    fn load_vulnerabilities(conn: &Connection, analysis_id: &str) -> Result<Vec<VulnerabilityRecord>> {
        let mut stmt = conn.prepare(
            "SELECT vulnerability_id, line, severity, type, description
             FROM vulnerabilities
             WHERE analysis_id = ?1
             ORDER BY ordinal",
        )?;

        let rows = stmt
            .query_map(params![analysis_id], |row| {
                Ok(VulnerabilityRecord {
                    vulnerability_id: uuid_column(row, 0)?,
                    vulnerability: Vulnerability {
                        line: row.get(1)?,
                        severity: risk_column(row, 2)?,
                        kind: row.get(3)?,
                        description: row.get(4)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn load_fixes(conn: &Connection, analysis_id: &str) -> Result<Vec<FixRecord>> {
        let mut stmt = conn.prepare(
            "SELECT fix_id, line, original, fixed, explanation
             FROM fixes
             WHERE analysis_id = ?1
             ORDER BY ordinal",
        )?;

        let rows = stmt
            .query_map(params![analysis_id], |row| {
                Ok(FixRecord {
                    fix_id: uuid_column(row, 0)?,
                    fix: Fix {
                        line: row.get(1)?,
                        original: row.get(2)?,
                        fixed: row.get(3)?,
                        explanation: row.get(4)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl AnalysisStore for Database {
    /// 在同一个事务中写入分析及其全部子记录
    fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let analysis_id = record.analysis_id.to_string();
        let created_at = format_timestamp(&record.created_at);

        tx.execute(
            "INSERT INTO code_analysis
            (analysis_id, code_snippet, risk_score, explanation, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                analysis_id,
                record.code_snippet,
                record.risk_score.as_str(),
                record.explanation,
                created_at,
                format_timestamp(&record.updated_at),
            ],
        )
        .context("Failed to insert analysis")?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO vulnerabilities
                (vulnerability_id, analysis_id, ordinal, line, severity, type, description, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (ordinal, v) in record.vulnerabilities.iter().enumerate() {
                stmt.execute(params![
                    v.vulnerability_id.to_string(),
                    analysis_id,
                    ordinal as i64,
                    v.vulnerability.line,
                    v.vulnerability.severity.as_str(),
                    v.vulnerability.kind,
                    v.vulnerability.description,
                    created_at,
                ])
                .context("Failed to insert vulnerability")?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO fixes
                (fix_id, analysis_id, ordinal, line, original, fixed, explanation, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (ordinal, f) in record.fixes.iter().enumerate() {
                stmt.execute(params![
                    f.fix_id.to_string(),
                    analysis_id,
                    ordinal as i64,
                    f.fix.line,
                    f.fix.original,
                    f.fix.fixed,
                    f.fix.explanation,
                    created_at,
                ])
                .context("Failed to insert fix")?;
            }
        }

        tx.commit().context("Failed to commit analysis")?;
        Ok(())
    }

    /// 获取单条分析（含漏洞与修复）
    fn get_analysis(&self, analysis_id: &Uuid) -> Result<Option<AnalysisRecord>> {
        let conn = self.lock()?;
        let id = analysis_id.to_string();

        let header = conn
            .query_row(
                "SELECT analysis_id, code_snippet, risk_score, explanation, created_at, updated_at
                 FROM code_analysis
                 WHERE analysis_id = ?1",
                params![id],
                |row| {
                    Ok(AnalysisRecord {
                        analysis_id: uuid_column(row, 0)?,
                        code_snippet: row.get(1)?,
                        risk_score: risk_column(row, 2)?,
                        explanation: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        created_at: timestamp_column(row, 4)?,
                        updated_at: timestamp_column(row, 5)?,
                        vulnerabilities: Vec::new(),
                        fixes: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut record) = header else {
            return Ok(None);
        };

        record.vulnerabilities = Self::load_vulnerabilities(&conn, &id)?;
        record.fixes = Self::load_fixes(&conn, &id)?;
        Ok(Some(record))
    }

    /// 按创建时间倒序分页列出历史
    fn list_analyses(&self, limit: u32, offset: u32) -> Result<Vec<AnalysisSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT a.analysis_id, a.code_snippet, a.risk_score, a.created_at,
                    (SELECT COUNT(*) FROM vulnerabilities v WHERE v.analysis_id = a.analysis_id)
             FROM code_analysis a
             ORDER BY a.created_at DESC, a.rowid DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let summaries = stmt
            .query_map(params![limit, offset], |row| {
                let snippet: String = row.get(1)?;
                Ok(AnalysisSummary {
                    analysis_id: uuid_column(row, 0)?,
                    code_snippet: preview_snippet(&snippet),
                    risk_score: risk_column(row, 2)?,
                    created_at: timestamp_column(row, 3)?,
                    vulnerability_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// 删除分析，子记录由外键级联删除
    fn delete_analysis(&self, analysis_id: &Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM code_analysis WHERE analysis_id = ?1",
            params![analysis_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Database probe failed")?;
        Ok(())
    }
}

/// 固定微秒精度，保证按字符串排序与按时间排序一致
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn risk_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<RiskLevel> {
    let raw: String = row.get(idx)?;
    RiskLevel::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown risk level {:?}", raw).into(),
        )
    })
}
