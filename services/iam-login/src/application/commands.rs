//! 命令定义

use crm_common::AccountId;
use crm_cqrs_core::Command;

use crate::domain::entities::Account;
use crate::domain::services::{ChallengeIssued, RefreshedSession, VerifiedIdentity};

/// 请求验证码
#[derive(Debug, Clone)]
pub struct RequestOtpCommand {
    pub phone: String,
}

impl Command for RequestOtpCommand {
    type Result = ChallengeIssued;
}

/// 提交验证码登录
#[derive(Debug, Clone)]
pub struct VerifyOtpCommand {
    pub phone: String,
    pub code: String,
}

impl Command for VerifyOtpCommand {
    type Result = VerifiedIdentity;
}

/// 刷新令牌
#[derive(Debug, Clone)]
pub struct RefreshTokenCommand {
    pub refresh_token: String,
}

impl Command for RefreshTokenCommand {
    type Result = RefreshedSession;
}

/// 停用账户
#[derive(Debug, Clone)]
pub struct DeactivateAccountCommand {
    pub account_id: AccountId,
    /// 执行停用的账户
    pub actor: AccountId,
}

impl Command for DeactivateAccountCommand {
    type Result = Account;
}
