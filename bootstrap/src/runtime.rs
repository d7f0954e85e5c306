//! 服务运行时

use crm_config::AppConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

/// 服务运行时配置
pub struct RuntimeConfig {
    pub config_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_dir: std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string()),
        }
    }
}

/// 初始化 tracing 和 metrics
///
/// 生产环境强制 JSON 日志；metrics recorder 安装失败时只关闭 /metrics
pub fn init_runtime(config: &AppConfig) -> Option<PrometheusHandle> {
    crm_telemetry::init(
        &config.telemetry.log_level,
        config.telemetry.json || config.is_production(),
    );

    let metrics = match crm_telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
            None
        }
    };

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );

    metrics
}
