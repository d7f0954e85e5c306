//! Redis 原子操作
//!
//! 所有读-改-写都通过 Lua 脚本在服务端一次完成

use std::collections::HashMap;

use crm_errors::{AppError, AppResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// 整体替换一个 hash 并设置绝对过期时间（毫秒时间戳）
const REPLACE_HASH_SCRIPT: &str = r"
redis.call('DEL', KEYS[1])
for i = 2, #ARGV, 2 do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('PEXPIREAT', KEYS[1], ARGV[1])
return 1
";

/// 仅当 hash 存在时递增字段，并在同一脚本内返回递增后的整个 hash；不存在返回空表
const INCR_FIELD_AND_GET_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {}
end
redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
return redis.call('HGETALL', KEYS[1])
";

/// 计数器不存在时创建并设置 TTL，存在时递增并保持原有 TTL
const INCR_WITH_TTL_SCRIPT: &str = r"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
";

/// Redis Cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// 原子性递增计数器，返回递增后的值
    pub async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> AppResult<i64> {
        let mut conn = self.conn.clone();
        Script::new(INCR_WITH_TTL_SCRIPT)
            .key(key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis incr_with_ttl failed: {}", e)))
    }

    /// 原子性替换整个 hash，到 `expire_at_ms` 时由 Redis 回收
    pub async fn replace_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        expire_at_ms: i64,
    ) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let script = Script::new(REPLACE_HASH_SCRIPT);
        let mut invocation = script.key(key);
        invocation.arg(expire_at_ms);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }

        invocation
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis replace_hash failed: {}", e)))?;
        Ok(())
    }

    /// 原子性递增 hash 字段并读取递增后的 hash；hash 不存在时返回空 map
    pub async fn incr_field_and_get(
        &self,
        key: &str,
        field: &str,
    ) -> AppResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Script::new(INCR_FIELD_AND_GET_SCRIPT)
            .key(key)
            .arg(field)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis incr_field_and_get failed: {}", e)))
    }

    /// 读取整个 hash；键不存在时返回空 map
    pub async fn get_hash(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis hgetall failed: {}", e)))
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis delete failed: {}", e)))
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        crate::check_connection(&mut conn).await
    }
}
