//! 集成测试公共装配：内存存储 + 低成本 argon2

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use crm_adapter_sms::{SmsError, SmsReceipt, SmsSender};
use crm_bootstrap::Infrastructure;
use crm_config::AppConfig;
use figment::Figment;
use figment::providers::{Format, Toml};
use iam_login::api::http::AppState;
use iam_login::infrastructure::persistence::{
    InMemoryAccountRepository, InMemoryChallengeRepository, InMemoryRequestThrottle,
};
use iam_login::{Dependencies, build_state};
use parking_lot::Mutex;

pub const BASE_CONFIG: &str = r#"
app_name = "iam-login-test"

[jwt]
secret = "integration-test-secret-0123456789abcdef"

[otp]
test_mode = true
fixed_code = "0000"

[otp.hash]
memory_kib = 8
iterations = 1
parallelism = 1
"#;

pub const WITH_BYPASS: &str = r#"
[otp]
bypass_code = "0000"
"#;

pub const WITH_SMS: &str = r#"
[sms]
api_key = "test-key"
sender = "10004346"
message_template = "Your CRM login code: {code}"
"#;

pub fn config(overlays: &[&str]) -> AppConfig {
    let figment = overlays
        .iter()
        .fold(Figment::new().merge(Toml::string(BASE_CONFIG)), |f, overlay| {
            f.merge(Toml::string(overlay))
        });
    AppConfig::from_figment(figment).expect("test config is valid")
}

/// 记录所有短信内容
#[derive(Default)]
pub struct RecordingSmsSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSmsSender {
    /// 最近一条短信中的验证码（正文末尾 4 位）
    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().last().map(|(_, body)| {
            let start = body.len().saturating_sub(4);
            body[start..].to_string()
        })
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_text(&self, phone: &str, body: &str) -> Result<SmsReceipt, SmsError> {
        self.sent.lock().push((phone.to_string(), body.to_string()));
        Ok(SmsReceipt {
            message_id: Some("8792343".to_string()),
        })
    }
}

pub struct Harness {
    pub config: AppConfig,
    pub state: AppState,
    pub accounts: Arc<InMemoryAccountRepository>,
    pub challenges: Arc<InMemoryChallengeRepository>,
    pub sms: Option<Arc<RecordingSmsSender>>,
}

pub fn harness(overlays: &[&str]) -> Harness {
    let config = config(overlays);
    let accounts = Arc::new(InMemoryAccountRepository::new());
    let challenges = Arc::new(InMemoryChallengeRepository::new());
    let sms = config
        .sms
        .as_ref()
        .map(|_| Arc::new(RecordingSmsSender::default()));

    let state = build_state(
        &config,
        Arc::new(Infrastructure::build_token_service(&config)),
        Dependencies {
            challenges: challenges.clone(),
            accounts: accounts.clone(),
            throttle: Arc::new(InMemoryRequestThrottle::new()),
            sms: sms.clone().map(|s| s as Arc<dyn SmsSender>),
        },
    )
    .expect("state builds");

    Harness {
        config,
        state,
        accounts,
        challenges,
        sms,
    }
}
