//! 万能验证码策略
//!
//! 与 `otp.test_mode` 相互独立，由启动时的配置决定注入哪种实现

use std::sync::Arc;

use crm_config::OtpConfig;

use crate::domain::value_objects::OtpCode;

pub trait BypassPolicy: Send + Sync {
    /// 该验证码是否跳过哈希校验
    fn accepts(&self, code: &OtpCode) -> bool;

    fn is_enabled(&self) -> bool;
}

/// 固定的万能验证码
pub struct FixedCodeBypass {
    code: String,
}

impl FixedCodeBypass {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl BypassPolicy for FixedCodeBypass {
    fn accepts(&self, code: &OtpCode) -> bool {
        code.as_str() == self.code
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// 不启用万能验证码
pub struct NoBypass;

impl BypassPolicy for NoBypass {
    fn accepts(&self, _code: &OtpCode) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

pub fn bypass_policy_from_config(config: &OtpConfig) -> Arc<dyn BypassPolicy> {
    match &config.bypass_code {
        Some(code) => Arc::new(FixedCodeBypass::new(code.clone())),
        None => Arc::new(NoBypass),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_code_bypass() {
        let policy = FixedCodeBypass::new("0000");
        assert!(policy.accepts(&OtpCode::from_submitted("0000")));
        assert!(policy.accepts(&OtpCode::from_submitted("۰۰۰۰")));
        assert!(!policy.accepts(&OtpCode::from_submitted("0001")));
    }

    #[test]
    fn test_from_config() {
        let mut config = OtpConfig::default();
        assert!(!bypass_policy_from_config(&config).is_enabled());

        config.bypass_code = Some("1234".to_string());
        let policy = bypass_policy_from_config(&config);
        assert!(policy.is_enabled());
        assert!(policy.accepts(&OtpCode::fixed("1234")));
    }

    #[test]
    fn test_independent_of_test_mode() {
        let config = OtpConfig {
            test_mode: false,
            bypass_code: Some("0000".to_string()),
            ..OtpConfig::default()
        };
        assert!(bypass_policy_from_config(&config).accepts(&OtpCode::fixed("0000")));
    }
}
