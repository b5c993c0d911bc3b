use crate::models::{AnalysisReport, Fix, RiskLevel, Vulnerability};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

pub const DEFAULT_LINE: u32 = 1;
pub const DEFAULT_VULNERABILITY_TYPE: &str = "Unknown";
pub const DEFAULT_EXPLANATION: &str = "Security analysis completed.";
const FALLBACK_EXPLANATION_PREFIX: &str = "Analysis completed but encountered an error parsing results";

lazy_static! {
    /// 开头的代码围栏，可带语言标记，例如 ```json
    static ref OPENING_FENCE: Regex = Regex::new(r"^```[A-Za-z0-9_+#.\-]*[ \t]*\r?\n?").unwrap();
    /// 结尾的代码围栏
    static ref CLOSING_FENCE: Regex = Regex::new(r"\r?\n?[ \t]*```$").unwrap();
}

/// 把模型返回的原始文本整理成严格类型的分析结果。
///
/// 任何输入都不会让它失败：无法解析时返回安全的兜底结果
/// （空列表、`Low` 风险、说明中带上解析错误）。
pub struct ResponseNormalizer;

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// 规范化模型输出；`code` 为用户提交的原始代码，仅用于诊断日志
    pub fn normalize(&self, raw: &str, code: &str) -> AnalysisReport {
        let report = match Self::extract_object(raw).and_then(|obj| Self::build_report(&obj)) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Error parsing model response: {:#}", e);
                return Self::fallback(&format!("{:#}", e));
            }
        };

        let line_count = code.lines().count().max(1);
        for vuln in &report.vulnerabilities {
            if vuln.line as usize > line_count {
                log::debug!(
                    "Vulnerability '{}' points at line {} beyond submitted code ({} lines)",
                    vuln.kind,
                    vuln.line,
                    line_count
                );
            }
        }

        report
    }

    /// 解析失败时使用的兜底结果
    pub fn fallback(reason: &str) -> AnalysisReport {
        AnalysisReport {
            vulnerabilities: Vec::new(),
            fixes: Vec::new(),
            risk_score: RiskLevel::Low,
            explanation: format!("{}: {}", FALLBACK_EXPLANATION_PREFIX, reason),
        }
    }

    /// 去掉围栏后先整体解析，失败再尝试第一个能解析的配平 `{...}` 片段
    fn extract_object(raw: &str) -> Result<Map<String, Value>> {
        let cleaned = strip_code_fence(raw);

        let value = match serde_json::from_str::<Value>(cleaned) {
            Ok(value) => value,
            Err(strict_err) => embedded_value(cleaned).with_context(|| {
                format!("Could not parse JSON from response ({})", strict_err)
            })?,
        };

        match value {
            Value::Object(obj) => Ok(obj),
            other => anyhow::bail!("Expected a JSON object, got {}", json_kind(&other)),
        }
    }

    fn build_report(obj: &Map<String, Value>) -> Result<AnalysisReport> {
        let vulnerabilities = entries(obj, "vulnerabilities")?
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| match entry.as_object() {
                Some(fields) => Some(Self::build_vulnerability(fields)),
                None => {
                    log::warn!(
                        "Skipping invalid vulnerability entry #{}: expected object, got {}",
                        idx,
                        json_kind(entry)
                    );
                    None
                }
            })
            .collect();

        let fixes = entries(obj, "fixes")?
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| match entry.as_object() {
                Some(fields) => Some(Self::build_fix(fields)),
                None => {
                    log::warn!(
                        "Skipping invalid fix entry #{}: expected object, got {}",
                        idx,
                        json_kind(entry)
                    );
                    None
                }
            })
            .collect();

        let risk_score = obj
            .get("risk_score")
            .and_then(Value::as_str)
            .and_then(RiskLevel::parse)
            .unwrap_or(RiskLevel::Medium);

        let explanation = text_field(obj.get("explanation"))
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());

        Ok(AnalysisReport {
            vulnerabilities,
            fixes,
            risk_score,
            explanation,
        })
    }

    fn build_vulnerability(fields: &Map<String, Value>) -> Vulnerability {
        let kind = text_field(fields.get("type"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VULNERABILITY_TYPE.to_string());

        Vulnerability {
            line: coerce_line(fields.get("line")),
            severity: fields
                .get("severity")
                .and_then(Value::as_str)
                .and_then(RiskLevel::parse)
                .unwrap_or(RiskLevel::Medium),
            kind,
            description: text_field(fields.get("description")).unwrap_or_default(),
        }
    }

    fn build_fix(fields: &Map<String, Value>) -> Fix {
        Fix {
            line: coerce_line(fields.get("line")),
            original: text_field(fields.get("original")).unwrap_or_default(),
            fixed: text_field(fields.get("fixed")).unwrap_or_default(),
            explanation: text_field(fields.get("explanation")).unwrap_or_default(),
        }
    }
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 去掉首尾空白以及包裹整段文本的 Markdown 代码围栏
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(m) = OPENING_FENCE.find(text) {
        text = &text[m.end()..];
    }
    if let Some(m) = CLOSING_FENCE.find(text) {
        text = &text[..m.start()];
    }
    text.trim()
}

/// 依次尝试每个 `{` 起始的配平片段，返回第一个能解析的 JSON 值
fn embedded_value(text: &str) -> Result<Value> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{') {
        let Some(span) = balanced_span(text, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(span) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e).context("Embedded JSON object is malformed"),
        None => anyhow::bail!("No JSON object found"),
    }
}

/// 从 `start` 处的 `{` 找到与之配平的 `}`，跳过字符串字面量中的括号
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// 取出数组字段；缺失或 null 视为空，其它非数组类型视为整体结构错误
fn entries<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a [Value]> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(other) => anyhow::bail!("'{}' must be an array, got {}", key, json_kind(other)),
    }
}

/// 行号：接受整数、浮点数和数字字符串；缺失、无法转换或小于 1 时取默认值
fn coerce_line(value: Option<&Value>) -> u32 {
    let from_float = |f: f64| {
        if f.is_finite() && f >= 1.0 {
            Some(f.trunc() as u64)
        } else {
            None
        }
    };

    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(from_float)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    };

    parsed
        .filter(|n| *n >= 1)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_LINE)
}

/// 文本字段：缺失或 null 返回 None，其它标量转成字符串
fn text_field(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
