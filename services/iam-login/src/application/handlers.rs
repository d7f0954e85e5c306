//! 命令处理器
//!
//! 处理器负责指标记录，领域服务只负责业务规则

use std::sync::Arc;

use async_trait::async_trait;
use crm_cqrs_core::CommandHandler;
use tracing::{info, warn};

use crate::application::commands::{
    DeactivateAccountCommand, RefreshTokenCommand, RequestOtpCommand, VerifyOtpCommand,
};
use crate::domain::entities::Account;
use crate::domain::repositories::AccountRepository;
use crate::domain::services::{
    ChallengeIssued, CredentialVerifier, OtpChallengeService, RefreshedSession, TokenIssuer,
    VerifiedIdentity,
};
use crate::error::{AuthError, AuthResult};
use crate::infrastructure::observability::metrics::{self, CommandTimer};

fn outcome<T>(result: &AuthResult<T>, success: &'static str) -> &'static str {
    match result {
        Ok(_) => success,
        Err(e) => e.code(),
    }
}

pub struct RequestOtpHandler {
    service: Arc<OtpChallengeService>,
}

impl RequestOtpHandler {
    pub fn new(service: Arc<OtpChallengeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CommandHandler<RequestOtpCommand> for RequestOtpHandler {
    type Error = AuthError;

    async fn handle(&self, command: RequestOtpCommand) -> AuthResult<ChallengeIssued> {
        let timer = CommandTimer::new("request_otp");
        let result = self.service.request_challenge(&command.phone).await;

        let label = match &result {
            Ok(issued) if issued.sent => "sent",
            Ok(_) => "fixed",
            Err(e) => e.code(),
        };
        metrics::record_otp_request(label);
        timer.finish(label);
        result
    }
}

pub struct VerifyOtpHandler {
    verifier: Arc<CredentialVerifier>,
}

impl VerifyOtpHandler {
    pub fn new(verifier: Arc<CredentialVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl CommandHandler<VerifyOtpCommand> for VerifyOtpHandler {
    type Error = AuthError;

    async fn handle(&self, command: VerifyOtpCommand) -> AuthResult<VerifiedIdentity> {
        let timer = CommandTimer::new("verify_otp");
        let result = self.verifier.verify(&command.phone, &command.code).await;

        if let Ok(identity) = &result {
            if identity.is_new_account {
                metrics::record_account_registered();
            }
        }
        let label = outcome(&result, "verified");
        metrics::record_otp_verification(label);
        timer.finish(label);
        result
    }
}

pub struct RefreshTokenHandler {
    issuer: Arc<TokenIssuer>,
}

impl RefreshTokenHandler {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl CommandHandler<RefreshTokenCommand> for RefreshTokenHandler {
    type Error = AuthError;

    async fn handle(&self, command: RefreshTokenCommand) -> AuthResult<RefreshedSession> {
        let timer = CommandTimer::new("refresh_token");
        let result = self.issuer.refresh(&command.refresh_token).await;

        let label = outcome(&result, "refreshed");
        metrics::record_token_refresh(label);
        timer.finish(label);
        result
    }
}

/// 停用账户并作废其未使用的验证码
pub struct DeactivateAccountHandler {
    accounts: Arc<dyn AccountRepository>,
    otp_service: Arc<OtpChallengeService>,
}

impl DeactivateAccountHandler {
    pub fn new(accounts: Arc<dyn AccountRepository>, otp_service: Arc<OtpChallengeService>) -> Self {
        Self {
            accounts,
            otp_service,
        }
    }
}

#[async_trait]
impl CommandHandler<DeactivateAccountCommand> for DeactivateAccountHandler {
    type Error = AuthError;

    async fn handle(&self, command: DeactivateAccountCommand) -> AuthResult<Account> {
        let timer = CommandTimer::new("deactivate_account");

        if command.account_id == command.actor {
            warn!(account_id = %command.actor, "Refusing self-deactivation");
            timer.finish(AuthError::Forbidden.code());
            return Err(AuthError::Forbidden);
        }

        let account = match self.accounts.set_active(&command.account_id, false).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                timer.finish(AuthError::AccountNotFound.code());
                return Err(AuthError::AccountNotFound);
            }
            Err(e) => {
                let err = AuthError::from(e);
                timer.finish(err.code());
                return Err(err);
            }
        };

        self.otp_service.invalidate_phone(&account.phone).await?;

        info!(
            account_id = %account.id,
            actor = %command.actor,
            "Account deactivated"
        );
        metrics::record_account_deactivated();
        timer.finish("deactivated");
        Ok(account)
    }
}
