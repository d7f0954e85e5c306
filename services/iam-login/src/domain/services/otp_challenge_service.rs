//! 验证码挑战服务
//!
//! 生成、哈希、存储、限流并投递验证码

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crm_adapter_sms::SmsSender;
use crm_config::{OtpConfig, SmsConfig};
use tracing::{debug, error, info, warn};

use crate::domain::repositories::{ChallengeRepository, RequestThrottle};
use crate::domain::services::CodeHasher;
use crate::domain::value_objects::{OtpCode, PhoneNumber};
use crate::error::{AuthError, AuthResult};

/// 签发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeIssued {
    pub phone: PhoneNumber,
    /// 是否经短信投递
    pub sent: bool,
    /// 仅固定验证码模式下返回明文
    pub debug_code: Option<String>,
    /// 有效期（秒）
    pub expires_in: i64,
}

/// 服务参数
#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub code_ttl: chrono::Duration,
    pub max_requests_per_window: u32,
    pub request_window: Duration,
    /// `Some` 表示固定验证码模式
    pub fixed_code: Option<String>,
    pub message_template: String,
    pub send_timeout: Duration,
}

impl OtpSettings {
    /// 固定验证码模式需要显式开启 `test_mode` 且未配置短信供应商
    pub fn from_config(otp: &OtpConfig, sms: Option<&SmsConfig>) -> Self {
        let fixed_code = (otp.test_mode && sms.is_none()).then(|| otp.fixed_code.clone());
        Self {
            code_ttl: chrono::Duration::seconds(otp.code_ttl_secs as i64),
            max_requests_per_window: otp.max_requests_per_window,
            request_window: Duration::from_secs(otp.request_window_secs),
            fixed_code,
            message_template: sms
                .map(|s| s.message_template.clone())
                .unwrap_or_else(|| "{code}".to_string()),
            send_timeout: Duration::from_secs(sms.map(|s| s.timeout_secs).unwrap_or(10)),
        }
    }

    pub fn is_fixed_code_mode(&self) -> bool {
        self.fixed_code.is_some()
    }
}

pub struct OtpChallengeService {
    challenges: Arc<dyn ChallengeRepository>,
    throttle: Arc<dyn RequestThrottle>,
    hasher: CodeHasher,
    sms_sender: Option<Arc<dyn SmsSender>>,
    settings: OtpSettings,
}

impl OtpChallengeService {
    pub fn new(
        challenges: Arc<dyn ChallengeRepository>,
        throttle: Arc<dyn RequestThrottle>,
        hasher: CodeHasher,
        sms_sender: Option<Arc<dyn SmsSender>>,
        settings: OtpSettings,
    ) -> Self {
        Self {
            challenges,
            throttle,
            hasher,
            sms_sender,
            settings,
        }
    }

    /// 签发验证码
    ///
    /// 先写入挑战再投递短信；投递失败时挑战保留，重新请求会覆盖
    pub async fn request_challenge(&self, raw_phone: &str) -> AuthResult<ChallengeIssued> {
        let phone = PhoneNumber::parse(raw_phone)?;
        debug!(phone = %phone.masked(), "OTP challenge requested");

        // 1. 选择验证码来源
        let (code, sender) = match (&self.settings.fixed_code, &self.sms_sender) {
            (Some(fixed), _) => (OtpCode::fixed(fixed.clone()), None),
            (None, Some(sender)) => (OtpCode::generate(), Some(sender.clone())),
            (None, None) => {
                error!(
                    phone = %phone.masked(),
                    "No SMS provider configured and fixed-code mode is off, cannot deliver OTP"
                );
                return Err(AuthError::DeliveryFailed);
            }
        };

        // 2. 请求限流
        let count = self
            .throttle
            .hit(&phone, self.settings.request_window)
            .await?;
        if count > self.settings.max_requests_per_window {
            warn!(phone = %phone.masked(), count, "Too many OTP requests in window");
            return Err(AuthError::TooManyRequests);
        }

        // 3. 哈希并写入
        let code_hash = self.hasher.hash(&code).await?;
        let expires_at = Utc::now() + self.settings.code_ttl;
        let challenge = self.challenges.upsert(&phone, &code_hash, expires_at).await?;
        let expires_in = challenge.remaining_seconds(Utc::now());

        // 4. 投递
        let Some(sender) = sender else {
            info!(phone = %phone.masked(), "OTP challenge issued in fixed-code mode");
            return Ok(ChallengeIssued {
                phone,
                sent: false,
                debug_code: Some(code.into_inner()),
                expires_in,
            });
        };

        let body = self
            .settings
            .message_template
            .replace("{code}", code.as_str());
        match tokio::time::timeout(self.settings.send_timeout, sender.send_text(phone.as_str(), &body))
            .await
        {
            Ok(Ok(receipt)) => {
                info!(
                    phone = %phone.masked(),
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "OTP sent"
                );
                Ok(ChallengeIssued {
                    phone,
                    sent: true,
                    debug_code: None,
                    expires_in,
                })
            }
            Ok(Err(e)) => {
                warn!(phone = %phone.masked(), error = %e, "OTP delivery failed");
                Err(AuthError::DeliveryFailed)
            }
            Err(_) => {
                warn!(
                    phone = %phone.masked(),
                    timeout_secs = self.settings.send_timeout.as_secs(),
                    "OTP delivery timed out"
                );
                Err(AuthError::DeliveryFailed)
            }
        }
    }

    /// 作废该手机号的有效挑战（幂等）
    pub async fn invalidate(&self, raw_phone: &str) -> AuthResult<()> {
        let phone = PhoneNumber::parse(raw_phone)?;
        self.invalidate_phone(&phone).await
    }

    pub async fn invalidate_phone(&self, phone: &PhoneNumber) -> AuthResult<()> {
        self.challenges.delete(phone).await?;
        info!(phone = %phone.masked(), "OTP challenge invalidated");
        Ok(())
    }
}
