//! 健康检查模块
//!
//! 提供 /health、/ready 和 /metrics 端点

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use redis::aio::ConnectionManager;
use serde::Serialize;
use sqlx::PgPool;

/// 健康检查状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: Vec<ComponentHealth>,
}

/// 组件健康状态
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            checks: vec![],
        }
    }

    pub fn add_check(&mut self, check: ComponentHealth) {
        if check.status != "healthy" {
            self.status = "unhealthy".to_string();
        }
        self.checks.push(check);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "healthy".to_string(),
            message: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 健康检查器
///
/// 未配置的依赖不参与 readiness 判断
#[derive(Clone, Default)]
pub struct HealthChecker {
    postgres: Option<PgPool>,
    redis: Option<ConnectionManager>,
}

impl HealthChecker {
    pub fn new(postgres: Option<PgPool>, redis: Option<ConnectionManager>) -> Self {
        Self { postgres, redis }
    }

    /// 存活检查（liveness），不检查依赖
    pub async fn liveness(&self) -> HealthStatus {
        HealthStatus::healthy()
    }

    /// 就绪检查（readiness）
    pub async fn readiness(&self) -> HealthStatus {
        let mut status = HealthStatus::healthy();

        if let Some(pool) = &self.postgres {
            status.add_check(match crm_adapter_postgres::check_connection(pool).await {
                Ok(()) => ComponentHealth::healthy("postgres"),
                Err(e) => ComponentHealth::unhealthy("postgres", e.to_string()),
            });
        }

        if let Some(conn) = &self.redis {
            let mut conn = conn.clone();
            status.add_check(match crm_adapter_redis::check_connection(&mut conn).await {
                Ok(()) => ComponentHealth::healthy("redis"),
                Err(e) => ComponentHealth::unhealthy("redis", e.to_string()),
            });
        }

        status
    }
}

#[derive(Clone)]
struct HealthState {
    checker: HealthChecker,
    metrics: Option<PrometheusHandle>,
}

/// 健康检查路由，合并到服务主路由
pub fn health_routes(checker: HealthChecker, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(HealthState { checker, metrics })
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.checker.liveness().await))
}

async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.checker.readiness().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics disabled".to_string(),
        ),
    }
}
