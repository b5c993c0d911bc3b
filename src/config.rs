use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const SERVICE_NAME: &str = "CodeShield AI Backend";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 指向可选 YAML 配置文件的环境变量
pub const CONFIG_FILE_ENV: &str = "CODESHIELD_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("codeshield").join("codeshield.db"))
            .unwrap_or_else(|| PathBuf::from("codeshield.db"));
        Self { path }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-pro".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 单次提交的代码最大字符数
    pub max_code_length: usize,
    /// 5xx 响应中是否回显内部错误细节
    pub expose_error_details: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_code_length: 50_000,
            expose_error_details: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gemini: GeminiConfig,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// 加载配置：默认值 -> 可选的 YAML 文件 -> 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_file(PathBuf::from(path))?,
            _ => Self::defaults(),
        };

        let vars: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        config.apply_env(&vars)?;
        Ok(config)
    }

    pub fn defaults() -> Self {
        Self {
            app_env: "development".to_string(),
            log_level: "info".to_string(),
            ..Default::default()
        }
    }

    pub fn from_yaml_file(path: PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: Self = serde_yaml::from_str(content)?;
        let defaults = Self::defaults();
        if config.app_env.is_empty() {
            config.app_env = defaults.app_env;
        }
        if config.log_level.is_empty() {
            config.log_level = defaults.log_level;
        }
        Ok(config)
    }

    /// 用环境变量覆盖配置，变量名与部署文档保持一致
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(v) = vars.get("APP_ENV") {
            self.app_env = v.clone();
        }
        if let Some(v) = vars.get("LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }
        if let Some(v) = vars.get("HOST") {
            self.server.host = v.clone();
        }
        if let Some(v) = parse_env(vars, "PORT")? {
            self.server.port = v;
        }
        if let Some(v) = vars.get("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = vars.get("GEMINI_API_KEY") {
            self.gemini.api_key = v.clone();
        }
        if let Some(v) = vars.get("GEMINI_MODEL") {
            self.gemini.model = v.clone();
        }
        if let Some(v) = parse_env(vars, "GEMINI_TEMPERATURE")? {
            self.gemini.temperature = v;
        }
        if let Some(v) = parse_env(vars, "GEMINI_MAX_TOKENS")? {
            self.gemini.max_tokens = v;
        }
        if let Some(v) = vars.get("GEMINI_BASE_URL") {
            self.gemini.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = parse_env(vars, "GEMINI_TIMEOUT_SECS")? {
            self.gemini.timeout_secs = v;
        }
        if let Some(v) = parse_env(vars, "MAX_CODE_LENGTH")? {
            self.security.max_code_length = v;
        }
        if let Some(v) = vars.get("EXPOSE_ERROR_DETAILS") {
            self.security.expose_error_details = parse_bool("EXPOSE_ERROR_DETAILS", v)?;
        }
        Ok(())
    }

    /// 返回配置警告；警告只记录日志，不阻止启动
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.gemini.api_key.trim().is_empty() {
            warnings.push("GEMINI_API_KEY is not set; analysis requests will fail".to_string());
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            warnings.push(format!(
                "GEMINI_TEMPERATURE {} is outside 0.0..=2.0",
                self.gemini.temperature
            ));
        }
        if self.gemini.max_tokens == 0 {
            warnings.push("GEMINI_MAX_TOKENS is 0".to_string());
        }
        if self.gemini.timeout_secs == 0 {
            warnings.push("GEMINI_TIMEOUT_SECS is 0; every analysis will time out".to_string());
        }
        if self.security.max_code_length == 0 {
            warnings.push("MAX_CODE_LENGTH is 0; every analysis will be rejected".to_string());
        }
        if self.app_env == "production" && self.security.expose_error_details {
            warnings.push("EXPOSE_ERROR_DETAILS should be false in production".to_string());
        }

        warnings
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T: FromStr>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, ConfigError> {
    match vars.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw.clone(),
            }),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
