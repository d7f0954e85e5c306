//! iam-login 服务入口

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crm_adapter_sms::{HttpSmsClient, SmsSender};
use crm_bootstrap::{Infrastructure, RuntimeConfig, ShutdownController, health_routes, init_runtime};
use crm_config::AppConfig;
use iam_login::api::http::router;
use iam_login::domain::repositories::{AccountRepository, ChallengeRepository, RequestThrottle};
use iam_login::infrastructure::cleanup::ChallengeReaper;
use iam_login::infrastructure::persistence::{
    InMemoryAccountRepository, InMemoryChallengeRepository, InMemoryRequestThrottle, MIGRATOR,
    PostgresAccountRepository, RedisChallengeRepository, RedisRequestThrottle,
};
use iam_login::{Dependencies, build_state};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let runtime = RuntimeConfig::default();
    let config = AppConfig::load(&runtime.config_dir).context("Failed to load configuration")?;
    let metrics = init_runtime(&config);

    let infra = Infrastructure::from_config(config)
        .await
        .context("Failed to initialize infrastructure")?;
    let config = infra.config();
    let retention = chrono::Duration::seconds(config.otp.retention_secs as i64);

    // 1. 存储
    let (challenges, throttle): (Arc<dyn ChallengeRepository>, Arc<dyn RequestThrottle>) =
        match infra.redis_cache() {
            Some(cache) => (
                Arc::new(RedisChallengeRepository::new(cache.clone(), retention)),
                Arc::new(RedisRequestThrottle::new(cache)),
            ),
            None => (
                Arc::new(InMemoryChallengeRepository::new()),
                Arc::new(InMemoryRequestThrottle::new()),
            ),
        };

    let accounts: Arc<dyn AccountRepository> = match infra.postgres_pool() {
        Some(pool) => {
            crm_adapter_postgres::run_migrations(&pool, &MIGRATOR)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PostgresAccountRepository::new(pool))
        }
        None => Arc::new(InMemoryAccountRepository::new()),
    };

    // 2. 短信供应商
    let sms: Option<Arc<dyn SmsSender>> = match &config.sms {
        Some(sms_config) => {
            let client = HttpSmsClient::new(sms_config.clone()).context("Failed to build SMS client")?;
            Some(Arc::new(client))
        }
        None => {
            warn!("SMS provider not configured");
            None
        }
    };

    // 3. 服务与路由
    let state = build_state(
        config,
        infra.token_service(),
        Dependencies {
            challenges: challenges.clone(),
            accounts,
            throttle,
            sms,
        },
    )
    .context("Failed to assemble services")?;

    let app = router(state).merge(health_routes(infra.health_checker(), metrics));

    // 4. 后台任务
    let shutdown = ShutdownController::new();
    shutdown.listen_for_signals();

    let reaper_handle = (config.otp.reaper_interval_secs > 0).then(|| {
        Arc::new(ChallengeReaper::new(
            challenges,
            Duration::from_secs(config.otp.reaper_interval_secs),
            retention,
        ))
        .start(shutdown.token())
    });

    // 5. HTTP 服务
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "iam-login listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await
        .context("HTTP server error")?;

    shutdown.shutdown();
    if let Some(handle) = reaper_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Challenge reaper did not stop cleanly");
        }
    }

    info!("iam-login stopped");
    Ok(())
}
