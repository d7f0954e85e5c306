//! 基础设施资源管理
//!
//! PostgreSQL / Redis 均为可选：未配置时服务退回内存存储（仅开发环境）

use std::sync::Arc;

use crm_adapter_postgres::{PostgresConfig, create_pool};
use crm_adapter_redis::{RedisCache, create_connection_manager};
use crm_auth_core::TokenService;
use crm_common::{RetryConfig, with_retry};
use crm_config::AppConfig;
use crm_errors::AppResult;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::{info, warn};

/// 基础设施资源容器
pub struct Infrastructure {
    config: AppConfig,
    postgres_pool: Option<PgPool>,
    redis_conn: Option<ConnectionManager>,
    token_service: Arc<TokenService>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let retry_config = RetryConfig::default();

        // 1. PostgreSQL
        let postgres_pool = match &config.database {
            Some(db) => {
                let pg_config = PostgresConfig::from(db);
                let pool = with_retry(&retry_config, "PostgreSQL connection", || {
                    let cfg = pg_config.clone();
                    async move { create_pool(&cfg).await }
                })
                .await?;
                info!(
                    max_connections = db.max_connections,
                    "PostgreSQL connection pool created"
                );
                Some(pool)
            }
            None => {
                warn!("Database not configured, accounts are kept in memory");
                None
            }
        };

        // 2. Redis
        let redis_conn = match &config.redis {
            Some(redis) => {
                let url = redis.url.clone();
                let conn = with_retry(&retry_config, "Redis connection", || {
                    let url = url.expose_secret().clone();
                    async move { create_connection_manager(&url).await }
                })
                .await?;
                info!("Redis connection created");
                Some(conn)
            }
            None => {
                warn!("Redis not configured, OTP challenges are kept in memory");
                None
            }
        };

        // 3. TokenService
        let token_service = Arc::new(Self::build_token_service(&config));

        Ok(Self {
            config,
            postgres_pool,
            redis_conn,
            token_service,
        })
    }

    pub fn build_token_service(config: &AppConfig) -> TokenService {
        TokenService::new(
            config.jwt.secret.expose_secret(),
            config.jwt.expires_in as i64,
            config.jwt.refresh_expires_in as i64,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn postgres_pool(&self) -> Option<PgPool> {
        self.postgres_pool.clone()
    }

    pub fn redis_connection_manager(&self) -> Option<ConnectionManager> {
        self.redis_conn.clone()
    }

    pub fn redis_cache(&self) -> Option<RedisCache> {
        self.redis_conn.clone().map(RedisCache::new)
    }

    pub fn token_service(&self) -> Arc<TokenService> {
        self.token_service.clone()
    }

    /// 健康检查器（与本实例共享连接）
    pub fn health_checker(&self) -> crate::HealthChecker {
        crate::HealthChecker::new(self.postgres_pool.clone(), self.redis_conn.clone())
    }
}
