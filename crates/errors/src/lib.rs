//! crm-errors - 统一错误处理
//!
//! 基于 RFC 7807 Problem Details 规范，额外携带稳定的机器可读 `code`

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// 是否为存储层故障（数据库 / 缓存）
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Cache(_))
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
            Self::Cache(_) => 500,
            Self::ExternalService(_) => 502,
            Self::ResourceExhausted(_) => 429,
        }
    }

    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL",
            Self::Database(_) | Self::Cache(_) => "STORAGE_FAULT",
            Self::ExternalService(_) => "EXTERNAL_SERVICE",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
        }
    }

    /// 转换为 Problem Details
    ///
    /// 5xx 错误不向调用方暴露内部细节
    pub fn to_problem_details(&self) -> ProblemDetails {
        let detail = if self.status_code() >= 500 {
            self.problem_title().to_string()
        } else {
            self.to_string()
        };
        ProblemDetails::new(self.status_code(), self.problem_title(), self.code(), detail)
    }

    fn problem_title(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Resource Not Found",
            Self::Validation(_) => "Validation Error",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::Conflict(_) => "Conflict",
            Self::Internal(_) => "Internal Server Error",
            Self::Database(_) | Self::Cache(_) => "Storage Error",
            Self::ExternalService(_) => "External Service Error",
            Self::ResourceExhausted(_) => "Resource Exhausted",
        }
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub code: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    pub fn new(
        status: u16,
        title: impl Into<String>,
        code: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let code = code.into();
        Self {
            r#type: format!(
                "https://api.crm.local/problems/{}",
                code.to_lowercase().replace('_', "-")
            ),
            title: title.into(),
            status,
            code,
            detail: detail.into(),
            instance: None,
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_problem_details().into_response()
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        assert_eq!(AppError::forbidden("x").status_code(), 403);
        assert_eq!(AppError::forbidden("x").code(), "FORBIDDEN");
        assert_eq!(AppError::cache("x").code(), "STORAGE_FAULT");
        assert_eq!(AppError::resource_exhausted("x").status_code(), 429);
    }

    #[test]
    fn test_problem_details_hides_internal_detail() {
        let problem = AppError::database("connection reset by 10.0.0.3").to_problem_details();
        assert_eq!(problem.status, 500);
        assert!(!problem.detail.contains("10.0.0.3"));
        assert_eq!(problem.r#type, "https://api.crm.local/problems/storage-fault");
    }

    #[test]
    fn test_problem_details_keeps_client_detail() {
        let problem = AppError::validation("phone is required").to_problem_details();
        assert_eq!(problem.status, 400);
        assert!(problem.detail.contains("phone is required"));
    }

    #[test]
    fn test_into_response_sets_problem_content_type() {
        let response = AppError::not_found("account").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
