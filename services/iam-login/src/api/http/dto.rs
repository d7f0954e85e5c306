//! HTTP 请求/响应模型（camelCase）

use std::collections::BTreeMap;

use crm_auth_core::{Role, RolePermissionTable, TokenPair};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::entities::Account;
use crate::domain::services::{ChallengeIssued, RefreshedSession, VerifiedIdentity};

/// 缺失或非字符串的手机号按空字符串处理，交给号码校验报 `INVALID_PHONE`
fn phone_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PhoneValue {
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match PhoneValue::deserialize(deserializer)? {
        PhoneValue::Text(phone) => phone,
        PhoneValue::Other(_) => String::new(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RequestOtpRequest {
    #[serde(default, deserialize_with = "phone_field")]
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpResponse {
    pub success: bool,
    /// 仅固定验证码模式下返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub expires_in: i64,
}

impl From<ChallengeIssued> for RequestOtpResponse {
    fn from(issued: ChallengeIssued) -> Self {
        Self {
            success: true,
            code: issued.debug_code,
            expires_in: issued.expires_in,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default, deserialize_with = "phone_field")]
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub id: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: String,
}

impl From<&Account> for AccountDto {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            phone: account.phone.to_string(),
            display_name: account.display_name.clone(),
            role: account.role,
            is_active: account.is_active,
            created_at: account.audit_info.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub success: bool,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub account: AccountDto,
    pub is_new_account: bool,
}

impl From<VerifiedIdentity> for VerifyOtpResponse {
    fn from(identity: VerifiedIdentity) -> Self {
        Self {
            success: true,
            account: AccountDto::from(&identity.account),
            tokens: identity.tokens,
            is_new_account: identity.is_new_account,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub success: bool,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

impl From<RefreshedSession> for RefreshTokenResponse {
    fn from(session: RefreshedSession) -> Self {
        Self {
            success: true,
            tokens: session.tokens,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub account: AccountDto,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: BTreeMap<Role, Vec<String>>,
}

impl From<&RolePermissionTable> for RolesResponse {
    fn from(table: &RolePermissionTable) -> Self {
        let roles = table
            .roles()
            .map(|(role, permissions)| (role, permissions.to_vec()))
            .collect();
        Self { roles }
    }
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub success: bool,
    pub account: AccountDto,
}
