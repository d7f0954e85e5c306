//! 验证码请求限流接口

use std::time::Duration;

use async_trait::async_trait;
use crm_errors::AppResult;

use crate::domain::value_objects::PhoneNumber;

/// 固定窗口计数器
#[async_trait]
pub trait RequestThrottle: Send + Sync {
    /// 记录一次请求，返回当前窗口内的请求数（含本次）
    async fn hit(&self, phone: &PhoneNumber, window: Duration) -> AppResult<u32>;
}
