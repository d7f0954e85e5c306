//! HTTP 路由

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use crm_auth_core::Role;
use crm_common::AccountId;
use crm_cqrs_core::CommandHandler;
use tower_http::trace::TraceLayer;

use crate::api::http::dto::{
    AccountDto, DeactivateResponse, MeResponse, RefreshTokenRequest, RefreshTokenResponse,
    RequestOtpRequest, RequestOtpResponse, RolesResponse, VerifyOtpRequest, VerifyOtpResponse,
};
use crate::api::http::middleware::{ApiJson, AuthClaims, CurrentAccount, Guard, authorize_request};
use crate::application::commands::{
    DeactivateAccountCommand, RefreshTokenCommand, RequestOtpCommand, VerifyOtpCommand,
};
use crate::application::handlers::{
    DeactivateAccountHandler, RefreshTokenHandler, RequestOtpHandler, VerifyOtpHandler,
};
use crate::domain::services::AuthorizationGate;
use crate::error::{AuthError, AuthResult};

/// 账户管理权限
pub const ACCOUNTS_MANAGE: &str = "accounts:manage";

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub request_otp: Arc<RequestOtpHandler>,
    pub verify_otp: Arc<VerifyOtpHandler>,
    pub refresh_token: Arc<RefreshTokenHandler>,
    pub deactivate_account: Arc<DeactivateAccountHandler>,
    pub gate: Arc<AuthorizationGate>,
}

pub fn router(state: AppState) -> Router {
    let gate = state.gate.clone();

    let public = Router::new()
        .route("/otp/request", post(request_otp))
        .route("/otp/verify", post(verify_otp))
        .route("/token/refresh", post(refresh_token));

    let me = Router::new().route("/me", get(me)).route_layer(
        middleware::from_fn_with_state(Guard::authenticated(gate.clone()), authorize_request),
    );

    let roles = Router::new().route("/rbac/roles", get(list_roles)).route_layer(
        middleware::from_fn_with_state(
            Guard::require_role(gate.clone(), [Role::TopAdmin]),
            authorize_request,
        ),
    );

    let accounts = Router::new()
        .route("/accounts/{id}/deactivate", post(deactivate_account))
        .route_layer(middleware::from_fn_with_state(
            Guard::require_permission(gate, ACCOUNTS_MANAGE),
            authorize_request,
        ));

    Router::new()
        .merge(public)
        .merge(me)
        .merge(roles)
        .merge(accounts)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn request_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RequestOtpRequest>,
) -> AuthResult<Json<RequestOtpResponse>> {
    let issued = state
        .request_otp
        .handle(RequestOtpCommand { phone: req.phone })
        .await?;
    Ok(Json(issued.into()))
}

async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyOtpRequest>,
) -> AuthResult<Json<VerifyOtpResponse>> {
    let identity = state
        .verify_otp
        .handle(VerifyOtpCommand {
            phone: req.phone,
            code: req.code,
        })
        .await?;
    Ok(Json(identity.into()))
}

async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> AuthResult<Json<RefreshTokenResponse>> {
    let session = state
        .refresh_token
        .handle(RefreshTokenCommand {
            refresh_token: req.refresh_token,
        })
        .await?;
    Ok(Json(session.into()))
}

async fn me(State(state): State<AppState>, CurrentAccount(account): CurrentAccount) -> Json<MeResponse> {
    let permissions = state.gate.permissions(account.role).to_vec();
    Json(MeResponse {
        account: AccountDto::from(&account),
        permissions,
    })
}

async fn list_roles(State(state): State<AppState>) -> Json<RolesResponse> {
    Json(RolesResponse::from(state.gate.table()))
}

async fn deactivate_account(
    State(state): State<AppState>,
    AuthClaims(claims): AuthClaims,
    Path(id): Path<String>,
) -> AuthResult<Json<DeactivateResponse>> {
    let account_id = AccountId::from_string(&id).map_err(|_| AuthError::AccountNotFound)?;
    let actor = claims.account_id()?;

    let account = state
        .deactivate_account
        .handle(DeactivateAccountCommand { account_id, actor })
        .await?;
    Ok(Json(DeactivateResponse {
        success: true,
        account: AccountDto::from(&account),
    }))
}
