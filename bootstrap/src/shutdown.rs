//! Graceful Shutdown

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shutdown 控制器
///
/// HTTP 服务器和后台任务共享同一个取消令牌
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        info!("Triggering shutdown");
        self.token.cancel();
    }

    /// 供后台任务使用的子令牌
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// 收到 Ctrl+C / SIGTERM 时触发关闭
    pub fn listen_for_signals(&self) {
        let controller = self.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            controller.shutdown();
        });
    }
}

/// 等待进程关闭信号
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
