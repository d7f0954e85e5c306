//! Redis 验证码挑战仓储与请求限流实现
//!
//! 挑战以 hash 存放在 `otp:challenge:{phone}`，字段：
//! `code_hash`、`attempts`、`created_at`、`expires_at`（毫秒时间戳）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crm_adapter_redis::RedisCache;
use crm_errors::{AppError, AppResult};
use tracing::debug;

use crate::domain::entities::OtpChallenge;
use crate::domain::repositories::{ChallengeRepository, RequestThrottle};
use crate::domain::value_objects::PhoneNumber;

const CHALLENGE_PREFIX: &str = "otp:challenge:";
const REQUESTS_PREFIX: &str = "otp:requests:";

fn challenge_key(phone: &PhoneNumber) -> String {
    format!("{}{}", CHALLENGE_PREFIX, phone.as_str())
}

/// Redis 挑战仓储
///
/// 键在 `expires_at + retention` 时由 Redis 回收，过期后的保留期内仍可区分“已过期”和“未请求”
pub struct RedisChallengeRepository {
    cache: RedisCache,
    retention: chrono::Duration,
}

impl RedisChallengeRepository {
    pub fn new(cache: RedisCache, retention: chrono::Duration) -> Self {
        Self { cache, retention }
    }

    fn parse_challenge(
        phone: &PhoneNumber,
        fields: HashMap<String, String>,
    ) -> AppResult<Option<OtpChallenge>> {
        if fields.is_empty() {
            return Ok(None);
        }

        let field = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| AppError::cache(format!("Challenge record missing field {}", name)))
        };
        let millis = |name: &str| -> AppResult<DateTime<Utc>> {
            let raw: i64 = field(name)?
                .parse()
                .map_err(|e| AppError::cache(format!("Invalid {} in challenge record: {}", name, e)))?;
            Utc.timestamp_millis_opt(raw)
                .single()
                .ok_or_else(|| AppError::cache(format!("Invalid {} in challenge record", name)))
        };

        Ok(Some(OtpChallenge {
            phone: phone.clone(),
            code_hash: field("code_hash")?.clone(),
            attempts: field("attempts")?
                .parse()
                .map_err(|e| AppError::cache(format!("Invalid attempts in challenge record: {}", e)))?,
            created_at: millis("created_at")?,
            expires_at: millis("expires_at")?,
        }))
    }
}

#[async_trait]
impl ChallengeRepository for RedisChallengeRepository {
    async fn upsert(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<OtpChallenge> {
        let challenge = OtpChallenge::new(phone.clone(), code_hash.to_string(), expires_at);
        let fields = [
            ("code_hash", challenge.code_hash.clone()),
            ("attempts", "0".to_string()),
            ("created_at", challenge.created_at.timestamp_millis().to_string()),
            ("expires_at", challenge.expires_at.timestamp_millis().to_string()),
        ];
        let evict_at = (expires_at + self.retention).timestamp_millis();

        self.cache
            .replace_hash(&challenge_key(phone), &fields, evict_at)
            .await?;
        debug!(phone = %phone.masked(), "Challenge stored");
        Ok(challenge)
    }

    async fn find(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>> {
        let fields = self.cache.get_hash(&challenge_key(phone)).await?;
        Self::parse_challenge(phone, fields)
    }

    async fn increment_attempts(&self, phone: &PhoneNumber) -> AppResult<Option<OtpChallenge>> {
        let fields = self
            .cache
            .incr_field_and_get(&challenge_key(phone), "attempts")
            .await?;
        Self::parse_challenge(phone, fields)
    }

    async fn delete(&self, phone: &PhoneNumber) -> AppResult<()> {
        self.cache.delete(&challenge_key(phone)).await
    }

    /// 过期记录由键 TTL 回收，这里无事可做
    async fn delete_expired(&self, _before: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }
}

/// Redis 请求限流：`otp:requests:{phone}` 计数器，首次请求时设置窗口 TTL
pub struct RedisRequestThrottle {
    cache: RedisCache,
}

impl RedisRequestThrottle {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RequestThrottle for RedisRequestThrottle {
    async fn hit(&self, phone: &PhoneNumber, window: Duration) -> AppResult<u32> {
        let key = format!("{}{}", REQUESTS_PREFIX, phone.as_str());
        let count = self
            .cache
            .incr_with_ttl(&key, window.as_secs().max(1))
            .await?;
        Ok(count.clamp(0, u32::MAX as i64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("09120000001").unwrap()
    }

    #[test]
    fn test_challenge_key() {
        assert_eq!(challenge_key(&phone()), "otp:challenge:09120000001");
    }

    #[test]
    fn test_parse_challenge() {
        let fields = HashMap::from([
            ("code_hash".to_string(), "$argon2id$v=19$...".to_string()),
            ("attempts".to_string(), "3".to_string()),
            ("created_at".to_string(), "1700000000000".to_string()),
            ("expires_at".to_string(), "1700000120000".to_string()),
        ]);

        let challenge = RedisChallengeRepository::parse_challenge(&phone(), fields)
            .unwrap()
            .unwrap();
        assert_eq!(challenge.attempts, 3);
        assert_eq!(challenge.expires_at.timestamp(), 1_700_000_120);
        assert_eq!((challenge.expires_at - challenge.created_at).num_seconds(), 120);
    }

    #[test]
    fn test_parse_missing_record() {
        let parsed = RedisChallengeRepository::parse_challenge(&phone(), HashMap::new()).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_parse_partial_record_is_an_error() {
        let fields = HashMap::from([("attempts".to_string(), "1".to_string())]);
        let err = RedisChallengeRepository::parse_challenge(&phone(), fields).unwrap_err();
        assert!(err.is_storage());
    }
}
