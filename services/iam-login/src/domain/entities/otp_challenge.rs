//! 验证码挑战实体

use chrono::{DateTime, Utc};

use crate::domain::value_objects::PhoneNumber;

/// 每个手机号最多一条有效挑战；只保存验证码的 argon2 哈希
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub phone: PhoneNumber,
    /// PHC 格式哈希
    pub code_hash: String,
    /// 已消耗的校验次数
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn new(phone: PhoneNumber, code_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            phone,
            code_hash,
            attempts: 0,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// `now >= expires_at` 即视为过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_locked(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}
