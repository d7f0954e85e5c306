//! crm-config - 配置加载库
//!
//! 加载顺序：`{dir}/default.toml` → `{dir}/{APP_ENV}.toml` → `CRM_` 前缀环境变量
//! （嵌套字段用 `__` 分隔，例如 `CRM_OTP__TEST_MODE=true`）

use std::collections::HashMap;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// JWT 密钥最小长度（字节）
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// JWT 配置
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    /// 访问令牌有效期（秒）
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// 刷新令牌有效期（秒）
    #[serde(default = "default_refresh_expires_in")]
    pub refresh_expires_in: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_expires_in() -> u64 {
    900
}

fn default_refresh_expires_in() -> u64 {
    30 * 24 * 3600
}

fn default_issuer() -> String {
    "crm-iam".to_string()
}

fn default_audience() -> String {
    "crm-api".to_string()
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 格式日志（生产环境）
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 验证码哈希参数（argon2id）
#[derive(Debug, Clone, Deserialize)]
pub struct CodeHashConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    19 * 1024
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for CodeHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// 短信验证码配置
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// 非生产环境的固定验证码模式（仅在未配置短信供应商时生效）
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_fixed_code")]
    pub fixed_code: String,
    /// 万能验证码；未配置或为空字符串时不启用
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bypass_code: Option<String>,
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,
    #[serde(default = "default_request_window_secs")]
    pub request_window_secs: u64,
    /// 过期记录在存储中保留的时间，之后由存储自行回收
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// 0 表示不启动清理任务
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    #[serde(default)]
    pub hash: CodeHashConfig,
}

/// 空字符串视为未配置（用于在更高优先级的配置层关闭某个值）
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn default_fixed_code() -> String {
    "0000".to_string()
}

fn default_code_ttl_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_requests_per_window() -> u32 {
    5
}

fn default_request_window_secs() -> u64 {
    3600
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_reaper_interval_secs() -> u64 {
    300
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            fixed_code: default_fixed_code(),
            bypass_code: None,
            code_ttl_secs: default_code_ttl_secs(),
            max_attempts: default_max_attempts(),
            max_requests_per_window: default_max_requests_per_window(),
            request_window_secs: default_request_window_secs(),
            retention_secs: default_retention_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            hash: CodeHashConfig::default(),
        }
    }
}

/// 短信供应商配置
#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    #[serde(default = "default_sms_base_url")]
    pub base_url: String,
    pub api_key: Secret<String>,
    pub sender: String,
    #[serde(default = "default_sms_timeout_secs")]
    pub timeout_secs: u64,
    /// `{code}` 会被替换为验证码
    #[serde(default = "default_message_template")]
    pub message_template: String,
}

fn default_sms_base_url() -> String {
    "https://api.kavenegar.com/v1".to_string()
}

fn default_sms_timeout_secs() -> u64 {
    10
}

fn default_message_template() -> String {
    "Your CRM login code: {code}".to_string()
}

/// 角色权限覆盖配置（角色名 → 权限列表）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RbacConfig {
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub server: ServerConfig,
    /// 未配置时使用内存账户存储（仅开发）
    pub database: Option<DatabaseConfig>,
    /// 未配置时使用内存验证码存储（仅开发）
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    pub sms: Option<SmsConfig>,
    #[serde(default)]
    pub rbac: RbacConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("CRM_").split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 Figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "jwt.secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.jwt.expires_in == 0 || self.jwt.refresh_expires_in <= self.jwt.expires_in {
            return Err(ConfigError::Invalid(
                "jwt.refresh_expires_in must exceed a non-zero jwt.expires_in".to_string(),
            ));
        }
        if self.otp.max_attempts == 0 {
            return Err(ConfigError::Invalid("otp.max_attempts must be positive".to_string()));
        }
        if self.otp.code_ttl_secs == 0 {
            return Err(ConfigError::Invalid("otp.code_ttl_secs must be positive".to_string()));
        }
        if self.otp.max_requests_per_window == 0 {
            return Err(ConfigError::Invalid(
                "otp.max_requests_per_window must be positive".to_string(),
            ));
        }
        if !is_four_digits(&self.otp.fixed_code) {
            return Err(ConfigError::Invalid("otp.fixed_code must be 4 digits".to_string()));
        }
        if let Some(code) = &self.otp.bypass_code {
            if !is_four_digits(code) {
                return Err(ConfigError::Invalid("otp.bypass_code must be 4 digits".to_string()));
            }
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

fn is_four_digits(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}
