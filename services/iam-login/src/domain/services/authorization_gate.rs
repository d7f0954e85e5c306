//! 授权闸门
//!
//! 校验访问令牌，再按账户当前状态和角色判断是否放行。
//! 令牌中的角色只作参考，判断始终以存储中的账户为准。

use std::sync::Arc;

use crm_auth_core::{Claims, Role, RolePermissionTable};
use tracing::{debug, warn};

use crate::domain::entities::Account;
use crate::domain::repositories::AccountRepository;
use crate::domain::services::TokenIssuer;
use crate::error::{AuthError, AuthResult};

/// 访问要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// 只要求已登录且账户启用
    Authenticated,
    /// 角色属于给定集合之一
    AnyRole(Vec<Role>),
    /// 角色拥有该权限
    Permission(String),
}

impl Requirement {
    pub fn role(role: Role) -> Self {
        Self::AnyRole(vec![role])
    }

    pub fn permission(permission: impl Into<String>) -> Self {
        Self::Permission(permission.into())
    }
}

pub struct AuthorizationGate {
    token_issuer: Arc<TokenIssuer>,
    accounts: Arc<dyn AccountRepository>,
    permissions: Arc<RolePermissionTable>,
}

impl AuthorizationGate {
    pub fn new(
        token_issuer: Arc<TokenIssuer>,
        accounts: Arc<dyn AccountRepository>,
        permissions: Arc<RolePermissionTable>,
    ) -> Self {
        Self {
            token_issuer,
            accounts,
            permissions,
        }
    }

    /// 解析 `Authorization` 头并校验访问令牌
    ///
    /// 缺失或不是 `Bearer <token>` 形式时返回 `Unauthorized`
    pub fn authenticate_bearer(&self, header: Option<&str>) -> AuthResult<Claims> {
        let token = header
            .and_then(|value| {
                let (scheme, token) = value.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
            })
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        self.token_issuer.verify_access(token)
    }

    /// 按要求授权，返回当前账户
    pub async fn authorize(&self, claims: &Claims, requirement: &Requirement) -> AuthResult<Account> {
        let account_id = claims.account_id()?;
        let account = match self.accounts.find_by_id(&account_id).await? {
            Some(account) if account.is_active => account,
            _ => {
                warn!(account_id = %account_id, "Token subject is missing or inactive");
                return Err(AuthError::AccountInactive);
            }
        };

        let allowed = match requirement {
            Requirement::Authenticated => true,
            Requirement::AnyRole(roles) => roles.contains(&account.role),
            Requirement::Permission(permission) => {
                self.permissions.has_permission(account.role, permission)
            }
        };

        if !allowed {
            warn!(
                account_id = %account.id,
                role = %account.role,
                requirement = ?requirement,
                "Access denied"
            );
            return Err(AuthError::Forbidden);
        }

        debug!(account_id = %account.id, role = %account.role, "Access granted");
        Ok(account)
    }

    pub fn permissions(&self, role: Role) -> &[String] {
        self.permissions.permissions(role)
    }

    pub fn table(&self) -> &RolePermissionTable {
        &self.permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PhoneNumber;
    use crate::infrastructure::persistence::InMemoryAccountRepository;
    use crm_auth_core::TokenService;

    struct Fixture {
        gate: AuthorizationGate,
        issuer: Arc<TokenIssuer>,
        accounts: Arc<InMemoryAccountRepository>,
    }

    fn fixture() -> Fixture {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let service = Arc::new(TokenService::new(
            "test-secret-key-at-least-32-chars-long",
            900,
            3600,
            "crm-iam",
            "crm-api",
        ));
        let issuer = Arc::new(TokenIssuer::new(service, accounts.clone()));
        let gate = AuthorizationGate::new(
            issuer.clone(),
            accounts.clone(),
            Arc::new(RolePermissionTable::builtin()),
        );
        Fixture {
            gate,
            issuer,
            accounts,
        }
    }

    async fn login(f: &Fixture, phone: &str, role: Role) -> (Account, Claims) {
        let account = f
            .accounts
            .create(&PhoneNumber::parse(phone).unwrap())
            .await
            .unwrap();
        f.accounts.set_role(&account.id, role);
        let account = account.with_role(role);
        let pair = f.issuer.issue(&account).unwrap();
        let header = format!("Bearer {}", pair.access_token);
        let claims = f.gate.authenticate_bearer(Some(&header)).unwrap();
        (account, claims)
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let f = fixture();
        for header in [None, Some(""), Some("Bearer"), Some("Bearer   "), Some("Basic abc")] {
            assert!(
                matches!(f.gate.authenticate_bearer(header), Err(AuthError::Unauthorized)),
                "{header:?}"
            );
        }
        assert!(matches!(
            f.gate.authenticate_bearer(Some("Bearer not-a-jwt")),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let f = fixture();
        let account = f
            .accounts
            .create(&PhoneNumber::parse("09120000001").unwrap())
            .await
            .unwrap();
        let pair = f.issuer.issue(&account).unwrap();
        let header = format!("Bearer {}", pair.refresh_token);
        assert!(matches!(
            f.gate.authenticate_bearer(Some(&header)),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_role_requirement() {
        let f = fixture();
        let (_, claims) = login(&f, "09120000001", Role::Marketer).await;

        assert!(f.gate.authorize(&claims, &Requirement::Authenticated).await.is_ok());
        assert!(matches!(
            f.gate
                .authorize(&claims, &Requirement::role(Role::FinanceManager))
                .await,
            Err(AuthError::Forbidden)
        ));
        assert!(
            f.gate
                .authorize(
                    &claims,
                    &Requirement::AnyRole(vec![Role::FinanceManager, Role::Marketer])
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_permission_requirement() {
        let f = fixture();
        let (_, admin) = login(&f, "09120000001", Role::TopAdmin).await;
        let (_, customer) = login(&f, "09120000002", Role::Customer).await;

        let manage = Requirement::permission("accounts:manage");
        assert!(f.gate.authorize(&admin, &manage).await.is_ok());
        assert!(matches!(
            f.gate.authorize(&customer, &manage).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_current_role_wins_over_token_role() {
        let f = fixture();
        let (account, claims) = login(&f, "09120000001", Role::Marketer).await;

        f.accounts.set_role(&account.id, Role::FinanceManager);
        let current = f
            .gate
            .authorize(&claims, &Requirement::role(Role::FinanceManager))
            .await
            .unwrap();
        assert_eq!(current.role, Role::FinanceManager);
    }

    #[tokio::test]
    async fn test_deactivated_account_is_rejected() {
        let f = fixture();
        let (account, claims) = login(&f, "09120000001", Role::TopAdmin).await;

        f.accounts.set_active(&account.id, false).await.unwrap();
        assert!(matches!(
            f.gate.authorize(&claims, &Requirement::Authenticated).await,
            Err(AuthError::AccountInactive)
        ));
    }
}
