//! JWT 令牌对

use chrono::{Duration, Utc};
use crm_common::AccountId;
use crm_errors::AppError;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::Role;

/// 令牌用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Access,
    Refresh,
}

/// JWT Claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    /// 仅 access token 携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// 仅 access token 携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub exp: i64,
    pub iat: i64,
    /// JWT ID
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub purpose: TokenPurpose,
}

impl Claims {
    pub fn account_id(&self) -> Result<AccountId, TokenError> {
        AccountId::from_string(&self.sub)
            .map_err(|_| TokenError::Invalid("subject is not an account id".to_string()))
    }

    pub fn is_access_token(&self) -> bool {
        self.purpose == TokenPurpose::Access
    }

    pub fn is_refresh_token(&self) -> bool {
        self.purpose == TokenPurpose::Refresh
    }
}

/// 令牌对
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// 访问令牌有效期（秒）
    pub expires_in: i64,
    /// 刷新令牌有效期（秒）
    pub refresh_expires_in: i64,
}

/// 令牌错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::internal(msg),
            other => AppError::unauthorized(other.to_string()),
        }
    }
}

/// Token 服务
///
/// 纯计算：签名 + 过期校验，不访问任何存储
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: i64,
    refresh_token_expires_in: i64,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(
        secret: &str,
        access_token_expires_in: i64,
        refresh_token_expires_in: i64,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in,
            refresh_token_expires_in,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// 签发令牌对
    pub fn issue_pair(
        &self,
        account_id: &AccountId,
        phone: &str,
        role: Role,
    ) -> Result<TokenPair, TokenError> {
        let access = self.claims(
            account_id,
            Some(role),
            Some(phone.to_string()),
            self.access_token_expires_in,
            TokenPurpose::Access,
        );
        let refresh = self.claims(
            account_id,
            None,
            None,
            self.refresh_token_expires_in,
            TokenPurpose::Refresh,
        );

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            expires_in: self.access_token_expires_in,
            refresh_expires_in: self.refresh_token_expires_in,
        })
    }

    /// 校验访问令牌（refresh token 在此处无效）
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenPurpose::Access)
    }

    /// 校验刷新令牌（access token 在此处无效）
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenPurpose::Refresh)
    }

    fn claims(
        &self,
        account_id: &AccountId,
        role: Option<Role>,
        phone: Option<String>,
        expires_in_secs: i64,
        purpose: TokenPurpose,
    ) -> Claims {
        let now = Utc::now();
        Claims {
            sub: account_id.to_string(),
            role,
            phone,
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::now_v7().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            purpose,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0; // 不允许时间偏差

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?
            .claims;

        if claims.purpose != expected {
            return Err(TokenError::Invalid(format!(
                "expected {:?} token, got {:?}",
                expected, claims.purpose
            )));
        }
        if claims.jti.is_empty() {
            return Err(TokenError::Invalid("Token ID (jti) missing".to_string()));
        }

        Ok(claims)
    }
}
