//! 内存存储实现
//!
//! 未配置 Redis / PostgreSQL 时的单实例实现，也用于测试

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_auth_core::Role;
use crm_common::AccountId;
use crm_errors::AppResult;
use parking_lot::Mutex;

use crate::domain::entities::{Account, OtpChallenge};
use crate::domain::repositories::{AccountRepository, ChallengeRepository, RequestThrottle};
use crate::domain::value_objects::PhoneNumber;

#[derive(Default)]
pub struct InMemoryChallengeRepository {
    challenges: Mutex<HashMap<PhoneNumber, OtpChallenge>>,
}

impl InMemoryChallengeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.challenges.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.lock().is_empty()
    }
}

#[async_trait]
impl ChallengeRepository for InMemoryChallengeRepository {
    async fn upsert(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<OtpChallenge> {
        let challenge = OtpChallenge::new(phone.clone(), code_hash.to_string(), expires_at);
        self.challenges.lock().insert(phone.clone(), challenge.clone());
        Ok(challenge)
    }

    async fn find(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>> {
        Ok(self.challenges.lock().get(phone).cloned())
    }

    async fn increment_attempts(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>> {
        let mut challenges = self.challenges.lock();
        Ok(challenges.get_mut(phone).map(|challenge| {
            challenge.attempts += 1;
            challenge.clone()
        }))
    }

    async fn delete(&self, phone: &PhoneNumber) -> AppResult<()> {
        self.challenges.lock().remove(phone);
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut challenges = self.challenges.lock();
        let count = challenges.len();
        challenges.retain(|_, challenge| challenge.expires_at >= before);
        Ok((count - challenges.len()) as u64)
    }
}

#[derive(Default)]
struct AccountStore {
    by_id: HashMap<AccountId, Account>,
    by_phone: HashMap<PhoneNumber, AccountId>,
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    store: Mutex<AccountStore>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接修改账户角色（角色管理不在本服务内，供初始化与测试使用）
    pub fn set_role(&self, id: &AccountId, role: Role) -> Option<Account> {
        let mut store = self.store.lock();
        let account = store.by_id.get_mut(id)?;
        account.role = role;
        account.audit_info.touch();
        Some(account.clone())
    }

    pub fn len(&self) -> usize {
        self.store.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().by_id.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_phone(&self, phone: &PhoneNumber) -> AppResult<Option<Account>> {
        let store = self.store.lock();
        Ok(store
            .by_phone
            .get(phone)
            .and_then(|id| store.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &AccountId) -> AppResult<Option<Account>> {
        Ok(self.store.lock().by_id.get(id).cloned())
    }

    async fn create(&self, phone: &PhoneNumber) -> AppResult<Account> {
        let mut store = self.store.lock();
        if let Some(existing) = store.by_phone.get(phone).and_then(|id| store.by_id.get(id)) {
            return Ok(existing.clone());
        }

        let account = Account::register(phone.clone());
        store.by_phone.insert(phone.clone(), account.id);
        store.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn set_active(&self, id: &AccountId, active: bool) -> AppResult<Option<Account>> {
        let mut store = self.store.lock();
        Ok(store.by_id.get_mut(id).map(|account| {
            account.set_active(active);
            account.clone()
        }))
    }
}

/// 固定窗口计数器；窗口从首次请求开始计算
#[derive(Default)]
pub struct InMemoryRequestThrottle {
    windows: Mutex<HashMap<PhoneNumber, (Instant, u32)>>,
}

impl InMemoryRequestThrottle {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestThrottle for InMemoryRequestThrottle {
    async fn hit(&self, phone: &PhoneNumber, window: Duration) -> AppResult<u32> {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        windows.retain(|_, (started, _)| now.duration_since(*started) < window);

        let entry = windows.entry(phone.clone()).or_insert((now, 0));
        entry.1 += 1;
        Ok(entry.1)
    }
}
