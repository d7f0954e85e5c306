//! 认证与授权中间件

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use crm_auth_core::{Claims, Role};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::entities::Account;
use crate::domain::services::{AuthorizationGate, Requirement};
use crate::error::AuthError;
use crate::infrastructure::observability::metrics;

/// 路由守卫状态：闸门 + 该路由的访问要求
#[derive(Clone)]
pub struct Guard {
    gate: Arc<AuthorizationGate>,
    requirement: Arc<Requirement>,
}

impl Guard {
    pub fn new(gate: Arc<AuthorizationGate>, requirement: Requirement) -> Self {
        Self {
            gate,
            requirement: Arc::new(requirement),
        }
    }

    pub fn authenticated(gate: Arc<AuthorizationGate>) -> Self {
        Self::new(gate, Requirement::Authenticated)
    }

    pub fn require_role(gate: Arc<AuthorizationGate>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self::new(gate, Requirement::AnyRole(roles.into_iter().collect()))
    }

    pub fn require_permission(gate: Arc<AuthorizationGate>, permission: impl Into<String>) -> Self {
        Self::new(gate, Requirement::permission(permission))
    }
}

/// 授权中间件
///
/// 通过后把 `Claims` 和当前 `Account` 写入请求扩展
pub async fn authorize_request(
    State(guard): State<Guard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let decision = match guard.gate.authenticate_bearer(header) {
        Ok(claims) => guard
            .gate
            .authorize(&claims, &guard.requirement)
            .await
            .map(|account| (claims, account)),
        Err(e) => Err(e),
    };

    match decision {
        Ok((claims, account)) => {
            metrics::record_authz_decision("allowed");
            debug!(account_id = %account.id, path = %request.uri().path(), "Request authorized");
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(account);
            Ok(next.run(request).await)
        }
        Err(e) => {
            metrics::record_authz_decision(e.code());
            Err(e)
        }
    }
}

/// 已校验的令牌 Claims
///
/// 只能用于挂了 `authorize_request` 的路由
pub struct AuthClaims(pub Claims);

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthClaims)
            .ok_or(AuthError::Unauthorized)
    }
}

/// 授权时读取的当前账户
pub struct CurrentAccount(pub Account);

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Account>()
            .cloned()
            .map(CurrentAccount)
            .ok_or(AuthError::Unauthorized)
    }
}

/// JSON 请求体；解析失败时返回问题文档而不是纯文本
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "Rejected request body");
                Err(AuthError::BadRequest(rejection.body_text()))
            }
        }
    }
}
