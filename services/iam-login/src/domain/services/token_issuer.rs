//! 令牌签发与刷新

use std::sync::Arc;

use crm_auth_core::{Claims, TokenPair, TokenService};
use tracing::{debug, info, warn};

use crate::domain::entities::Account;
use crate::domain::repositories::AccountRepository;
use crate::error::{AuthError, AuthResult};

/// 刷新结果
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub account: Account,
    pub tokens: TokenPair,
}

/// 在 `TokenService` 之上叠加账户状态检查
///
/// 刷新是无状态的：旧的刷新令牌在过期前依然有效
pub struct TokenIssuer {
    token_service: Arc<TokenService>,
    accounts: Arc<dyn AccountRepository>,
}

impl TokenIssuer {
    pub fn new(token_service: Arc<TokenService>, accounts: Arc<dyn AccountRepository>) -> Self {
        Self {
            token_service,
            accounts,
        }
    }

    pub fn issue(&self, account: &Account) -> AuthResult<TokenPair> {
        let pair = self
            .token_service
            .issue_pair(&account.id, account.phone.as_str(), account.role)?;
        debug!(account_id = %account.id, role = %account.role, "Token pair issued");
        Ok(pair)
    }

    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        Ok(self.token_service.verify_access(token)?)
    }

    /// 用刷新令牌换取新的令牌对，角色取账户当前值
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedSession> {
        let claims = self.token_service.verify_refresh(refresh_token).map_err(|e| {
            warn!(error = %e, "Refresh token rejected");
            AuthError::from(e)
        })?;
        let account_id = claims.account_id()?;

        let account = self
            .accounts
            .find_by_id(&account_id)
            .await?
            .ok_or_else(|| {
                warn!(account_id = %account_id, "Refresh token subject does not resolve");
                AuthError::TokenInvalid
            })?;

        if !account.is_active {
            warn!(account_id = %account.id, "Refresh rejected for inactive account");
            return Err(AuthError::AccountInactive);
        }

        let tokens = self.issue(&account)?;
        info!(account_id = %account.id, "Token pair refreshed");
        Ok(RefreshedSession { account, tokens })
    }
}
