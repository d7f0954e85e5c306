//! 依赖装配

use std::sync::Arc;

use crm_adapter_sms::SmsSender;
use crm_auth_core::{RolePermissionTable, TokenService};
use crm_config::AppConfig;
use crm_errors::{AppError, AppResult};
use tracing::{info, warn};

use crate::api::http::AppState;
use crate::application::handlers::{
    DeactivateAccountHandler, RefreshTokenHandler, RequestOtpHandler, VerifyOtpHandler,
};
use crate::domain::repositories::{AccountRepository, ChallengeRepository, RequestThrottle};
use crate::domain::services::{
    AuthorizationGate, CodeHasher, CredentialVerifier, OtpChallengeService, OtpSettings,
    TokenIssuer, bypass_policy_from_config,
};

/// 外部依赖：存储与短信供应商
#[derive(Clone)]
pub struct Dependencies {
    pub challenges: Arc<dyn ChallengeRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub throttle: Arc<dyn RequestThrottle>,
    pub sms: Option<Arc<dyn SmsSender>>,
}

/// 组装领域服务与命令处理器
pub fn build_state(
    config: &AppConfig,
    token_service: Arc<TokenService>,
    deps: Dependencies,
) -> AppResult<AppState> {
    let hasher = CodeHasher::new(&config.otp.hash)?;
    let permissions = RolePermissionTable::builtin()
        .with_overrides(&config.rbac.roles)
        .map_err(|e| AppError::validation(format!("Invalid rbac configuration: {}", e)))?;

    let settings = OtpSettings::from_config(&config.otp, config.sms.as_ref());
    if settings.is_fixed_code_mode() {
        if config.is_production() {
            warn!("Fixed-code OTP mode is active in production, codes are not delivered by SMS");
        } else {
            info!("Fixed-code OTP mode is active");
        }
    }

    let bypass = bypass_policy_from_config(&config.otp);
    if bypass.is_enabled() && config.is_production() {
        warn!("SECURITY WARNING: OTP bypass code is enabled in production");
    }

    let otp_service = Arc::new(OtpChallengeService::new(
        deps.challenges.clone(),
        deps.throttle,
        hasher.clone(),
        deps.sms,
        settings,
    ));
    let token_issuer = Arc::new(TokenIssuer::new(token_service, deps.accounts.clone()));
    let verifier = Arc::new(CredentialVerifier::new(
        deps.challenges,
        deps.accounts.clone(),
        hasher,
        bypass,
        token_issuer.clone(),
        config.otp.max_attempts,
    ));
    let gate = Arc::new(AuthorizationGate::new(
        token_issuer.clone(),
        deps.accounts.clone(),
        Arc::new(permissions),
    ));

    Ok(AppState {
        request_otp: Arc::new(RequestOtpHandler::new(otp_service.clone())),
        verify_otp: Arc::new(VerifyOtpHandler::new(verifier)),
        refresh_token: Arc::new(RefreshTokenHandler::new(token_issuer)),
        deactivate_account: Arc::new(DeactivateAccountHandler::new(deps.accounts, otp_service)),
        gate,
    })
}
