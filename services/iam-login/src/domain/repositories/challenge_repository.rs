//! 验证码挑战仓储接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_errors::AppResult;

use crate::domain::entities::OtpChallenge;
use crate::domain::value_objects::PhoneNumber;

/// 验证码挑战存储
///
/// 同一手机号的并发调用必须安全：`upsert` 与 `increment_attempts` 都是单次原子操作
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// 替换该手机号的现有挑战，次数归零
    async fn upsert(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<OtpChallenge>;

    async fn find(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>>;

    /// 原子递增并返回递增后的整条记录；记录不存在时返回 `None`，且不会重新创建记录
    ///
    /// 返回值与递增属于同一次原子操作，调用方必须以它为准，不能沿用之前 `find` 的结果
    async fn increment_attempts(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>>;

    /// 幂等删除
    async fn delete(&self, phone: &PhoneNumber) -> AppResult<()>;

    /// 删除 `expires_at < before` 的挑战，返回删除数量
    async fn delete_expired(&self, before: DateTime<Utc>) -> AppResult<u64>;
}
