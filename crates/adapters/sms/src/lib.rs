//! SMS 适配器
//!
//! 提供短信发送功能：
//! - `SmsSender` 发送接口（服务层依赖此 trait）
//! - `HttpSmsClient` 基于 HTTP API 的供应商客户端

mod client;

pub use client::HttpSmsClient;

use crm_errors::AppError;
use thiserror::Error;

/// 供应商回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    /// 供应商消息 ID（部分供应商不返回）
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS request failed: {0}")]
    Transport(String),

    #[error("SMS request timed out")]
    Timeout,

    #[error("SMS provider rejected message (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected SMS provider response: {0}")]
    Decode(String),
}

impl From<SmsError> for AppError {
    fn from(err: SmsError) -> Self {
        AppError::external_service(err.to_string())
    }
}

/// 短信发送接口
#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    /// 发送纯文本短信
    async fn send_text(&self, phone: &str, body: &str) -> Result<SmsReceipt, SmsError>;
}
