//! Command trait 定义

use async_trait::async_trait;
use crm_errors::AppError;

/// Command trait
pub trait Command: Send + Sync {
    type Result: Send;
}

/// Command Handler trait
///
/// 错误类型由具体服务决定，只要求能转换为 `AppError`
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    type Error: Into<AppError> + Send;

    async fn handle(&self, command: C) -> Result<C::Result, Self::Error>;
}
