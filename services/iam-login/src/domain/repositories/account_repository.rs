//! 账户仓储接口

use async_trait::async_trait;
use crm_common::AccountId;
use crm_errors::AppResult;

use crate::domain::entities::Account;
use crate::domain::value_objects::PhoneNumber;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &PhoneNumber) -> AppResult<Option<Account>>;

    async fn find_by_id(&self, id: &AccountId) -> AppResult<Option<Account>>;

    /// 以默认角色创建账户
    ///
    /// 并发创建同一手机号时返回先创建的那条记录，保证每个手机号只有一个账户
    async fn create(&self, phone: &PhoneNumber) -> AppResult<Account>;

    /// 返回更新后的账户；账户不存在时返回 `None`
    async fn set_active(&self, id: &AccountId, active: bool) -> AppResult<Option<Account>>;
}
