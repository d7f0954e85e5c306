//! 登录服务业务指标

use std::time::Instant;

use metrics::{counter, histogram};

// ============================================================================
// 验证码 Metrics
// ============================================================================

/// 记录验证码请求，`outcome` 取错误码或 `sent` / `fixed`
pub fn record_otp_request(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("crm_otp_requests_total", &labels).increment(1);
}

/// 记录验证码校验结果
pub fn record_otp_verification(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("crm_otp_verifications_total", &labels).increment(1);
}

/// 记录新注册账户
pub fn record_account_registered() {
    counter!("crm_accounts_registered_total").increment(1);
}

/// 记录过期挑战清理
pub fn record_challenges_reaped(count: u64) {
    counter!("crm_otp_challenges_reaped_total").increment(count);
}

// ============================================================================
// 令牌与授权 Metrics
// ============================================================================

/// 记录令牌刷新
pub fn record_token_refresh(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("crm_token_refreshes_total", &labels).increment(1);
}

/// 记录授权判断，`decision` 为 `allowed` 或错误码
pub fn record_authz_decision(decision: &str) {
    let labels = [("decision", decision.to_string())];
    counter!("crm_authz_decisions_total", &labels).increment(1);
}

/// 记录账户停用
pub fn record_account_deactivated() {
    counter!("crm_accounts_deactivated_total").increment(1);
}

// ============================================================================
// 命令耗时
// ============================================================================

/// 命令计时器
pub struct CommandTimer {
    start: Instant,
    command: &'static str,
}

impl CommandTimer {
    pub fn new(command: &'static str) -> Self {
        Self {
            start: Instant::now(),
            command,
        }
    }

    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64() * 1000.0;
        let labels = [
            ("command", self.command.to_string()),
            ("outcome", outcome.to_string()),
        ];
        histogram!("crm_command_duration_ms", &labels).record(duration);
    }
}
