//! 过期挑战清理任务
//!
//! 定期删除过期超过保留期的验证码挑战

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crm_errors::AppResult;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::repositories::ChallengeRepository;
use crate::infrastructure::observability::metrics;

pub struct ChallengeReaper {
    challenges: Arc<dyn ChallengeRepository>,
    interval: Duration,
    retention: chrono::Duration,
}

impl ChallengeReaper {
    pub fn new(
        challenges: Arc<dyn ChallengeRepository>,
        interval: Duration,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            challenges,
            interval,
            retention,
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Challenge reaper started");
            let mut ticker = interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Failed to reap expired challenges");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Challenge reaper received shutdown signal");
                        break;
                    }
                }
            }
            info!("Challenge reaper stopped");
        })
    }

    /// 执行一次清理，返回删除数量
    pub async fn run_once(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - self.retention;
        let removed = self.challenges.delete_expired(cutoff).await?;
        if removed > 0 {
            info!(removed, "Expired challenges reaped");
            metrics::record_challenges_reaped(removed);
        } else {
            debug!("No expired challenges to reap");
        }
        Ok(removed)
    }
}
