use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 存档的代码片段最大字符数
pub const STORED_SNIPPET_CHARS: usize = 1000;

/// 历史列表中展示的片段最大字符数
pub const HISTORY_PREVIEW_CHARS: usize = 100;

/// 风险等级（整体 risk_score 与单个漏洞 severity 共用同一刻度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

/// 单个漏洞的严重程度
pub type Severity = RiskLevel;

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        }
    }

    /// 宽松解析：忽略首尾空白与大小写，无法识别时返回 None
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("high") {
            Some(RiskLevel::High)
        } else if value.eq_ignore_ascii_case("medium") {
            Some(RiskLevel::Medium)
        } else if value.eq_ignore_ascii_case("low") {
            Some(RiskLevel::Low)
        } else {
            None
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI 报告的一个漏洞
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub line: u32,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// AI 建议的一处修复，与漏洞不是一一对应关系
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub line: u32,
    pub original: String,
    pub fixed: String,
    pub explanation: String,
}

/// 一次分析的规范化结果，也是 `POST /analyze` 的响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub vulnerabilities: Vec<Vulnerability>,
    pub fixes: Vec<Fix>,
    pub risk_score: RiskLevel,
    pub explanation: String,
}

/// 已存储的漏洞记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub vulnerability_id: Uuid,
    #[serde(flatten)]
    pub vulnerability: Vulnerability,
}

/// 已存储的修复记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecord {
    pub fix_id: Uuid,
    #[serde(flatten)]
    pub fix: Fix,
}

/// 完整的分析记录（含子记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: Uuid,
    pub code_snippet: String,
    pub risk_score: RiskLevel,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub fixes: Vec<FixRecord>,
}

impl AnalysisRecord {
    /// 根据提交的代码与规范化结果构建一条新记录，ID 与时间戳在此生成
    pub fn new(code: &str, report: &AnalysisReport) -> Self {
        // 存储精度为微秒
        let now = Utc::now().trunc_subsecs(6);

        Self {
            analysis_id: Uuid::new_v4(),
            code_snippet: truncate_chars(code, STORED_SNIPPET_CHARS).to_string(),
            risk_score: report.risk_score,
            explanation: report.explanation.clone(),
            created_at: now,
            updated_at: now,
            vulnerabilities: report
                .vulnerabilities
                .iter()
                .map(|v| VulnerabilityRecord {
                    vulnerability_id: Uuid::new_v4(),
                    vulnerability: v.clone(),
                })
                .collect(),
            fixes: report
                .fixes
                .iter()
                .map(|f| FixRecord {
                    fix_id: Uuid::new_v4(),
                    fix: f.clone(),
                })
                .collect(),
        }
    }

    pub fn to_report(&self) -> AnalysisReport {
        AnalysisReport {
            vulnerabilities: self.vulnerabilities.iter().map(|v| v.vulnerability.clone()).collect(),
            fixes: self.fixes.iter().map(|f| f.fix.clone()).collect(),
            risk_score: self.risk_score,
            explanation: self.explanation.clone(),
        }
    }
}

/// 历史列表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analysis_id: Uuid,
    pub code_snippet: String,
    pub risk_score: RiskLevel,
    pub vulnerability_count: u32,
    pub created_at: DateTime<Utc>,
}

/// 生成历史预览：超过上限时截断并追加 "..."
pub fn preview_snippet(snippet: &str) -> String {
    let head = truncate_chars(snippet, HISTORY_PREVIEW_CHARS);
    if head.len() < snippet.len() {
        format!("{}...", head)
    } else {
        snippet.to_string()
    }
}

/// 按字符（而非字节）截断，保证不落在 UTF-8 边界中间
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_parse_is_lenient() {
        assert_eq!(RiskLevel::parse(" high "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("MEDIUM"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("Low"), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::parse("Critical"), None);
        assert_eq!(RiskLevel::parse(""), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "安全审计".repeat(10);
        assert_eq!(truncate_chars(&text, 3), "安全审");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn preview_appends_ellipsis_only_when_truncated() {
        let exact = "a".repeat(HISTORY_PREVIEW_CHARS);
        assert_eq!(preview_snippet(&exact), exact);

        let long = "b".repeat(HISTORY_PREVIEW_CHARS + 1);
        let preview = preview_snippet(&long);
        assert_eq!(preview.len(), HISTORY_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn new_record_truncates_snippet_but_keeps_report() {
        let code = "x".repeat(STORED_SNIPPET_CHARS + 500);
        let report = AnalysisReport {
            vulnerabilities: vec![Vulnerability {
                line: 2,
                severity: RiskLevel::High,
                kind: "SQLi".to_string(),
                description: "unsanitized input".to_string(),
            }],
            fixes: vec![],
            risk_score: RiskLevel::High,
            explanation: "bad".to_string(),
        };

        let record = AnalysisRecord::new(&code, &report);
        assert_eq!(record.code_snippet.chars().count(), STORED_SNIPPET_CHARS);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.to_report(), report);
    }

    #[test]
    fn vulnerability_serializes_kind_as_type() {
        let v = Vulnerability {
            line: 1,
            severity: RiskLevel::Low,
            kind: "XSS".to_string(),
            description: String::new(),
        };
        let value = serde_json::to_value(&v).unwrap();
        assert_eq!(value["type"], "XSS");
        assert_eq!(value["severity"], "Low");
    }
}
