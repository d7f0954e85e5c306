//! 服务错误定义

use axum::response::{IntoResponse, Response};
use crm_auth_core::TokenError;
use crm_errors::{AppError, ProblemDetails};
use thiserror::Error;
use tracing::error;

use crate::domain::value_objects::PhoneError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Phone number is not a valid mobile number")]
    InvalidPhone,

    #[error("Verification code could not be delivered, please try again")]
    DeliveryFailed,

    #[error("No verification code has been requested for this phone number")]
    NoChallenge,

    #[error("Verification code has expired, please request a new one")]
    ChallengeExpired,

    #[error("Too many failed attempts, please request a new code")]
    TooManyAttempts,

    #[error("Too many code requests, please try again later")]
    TooManyRequests,

    #[error("Verification code is incorrect")]
    InvalidCode,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Storage error: {0}")]
    StorageFault(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Malformed request body: {0}")]
    BadRequest(String),
}

impl AuthError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPhone => "INVALID_PHONE",
            Self::DeliveryFailed => "DELIVERY_FAILED",
            Self::NoChallenge => "NO_CHALLENGE",
            Self::ChallengeExpired => "CHALLENGE_EXPIRED",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::InvalidCode => "INVALID_CODE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "INVALID_TOKEN",
            Self::AccountInactive => "ACCOUNT_INACTIVE",
            Self::Forbidden => "FORBIDDEN",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::StorageFault(_) => "STORAGE_FAULT",
            Self::Internal(_) => "INTERNAL",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPhone
            | Self::NoChallenge
            | Self::ChallengeExpired
            | Self::InvalidCode
            | Self::BadRequest(_) => 400,
            Self::Unauthorized
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::AccountInactive => 401,
            Self::Forbidden => 403,
            Self::AccountNotFound => 404,
            Self::TooManyAttempts | Self::TooManyRequests => 429,
            Self::DeliveryFailed => 502,
            Self::StorageFault(_) | Self::Internal(_) => 500,
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            429 => "Too Many Requests",
            502 => "Bad Gateway",
            _ => "Internal Server Error",
        }
    }

    /// 5xx 不向调用方暴露内部细节
    pub fn to_problem_details(&self) -> ProblemDetails {
        let detail = match self {
            Self::StorageFault(_) => "A storage error occurred, please try again later".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        ProblemDetails::new(self.status_code(), self.title(), self.code(), detail)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self.status_code() >= 500 {
            error!(code = self.code(), error = %self, "Request failed");
        }
        self.to_problem_details().into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        if err.is_storage() {
            AuthError::StorageFault(err.to_string())
        } else {
            AuthError::Internal(err.to_string())
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid(_) => AuthError::TokenInvalid,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<PhoneError> for AuthError {
    fn from(_: PhoneError) -> Self {
        AuthError::InvalidPhone
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidPhone
            | AuthError::NoChallenge
            | AuthError::ChallengeExpired
            | AuthError::InvalidCode
            | AuthError::BadRequest(_) => AppError::validation(err.to_string()),
            AuthError::Unauthorized
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::AccountInactive => AppError::unauthorized(err.to_string()),
            AuthError::Forbidden => AppError::forbidden(err.to_string()),
            AuthError::AccountNotFound => AppError::not_found(err.to_string()),
            AuthError::TooManyAttempts | AuthError::TooManyRequests => {
                AppError::resource_exhausted(err.to_string())
            }
            AuthError::DeliveryFailed => AppError::external_service(err.to_string()),
            AuthError::StorageFault(msg) => AppError::database(msg),
            AuthError::Internal(msg) => AppError::internal(msg),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
