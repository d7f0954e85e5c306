//! 验证码哈希（argon2id）
//!
//! 哈希与校验都在 blocking 线程池执行

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, Version};
use crm_config::CodeHashConfig;
use crm_errors::{AppError, AppResult};

use crate::domain::value_objects::OtpCode;

#[derive(Clone)]
pub struct CodeHasher {
    params: Params,
}

impl CodeHasher {
    pub fn new(config: &CodeHashConfig) -> AppResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AppError::internal(format!("Invalid argon2 parameters: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// 生成加盐的 PHC 格式哈希
    pub async fn hash(&self, code: &OtpCode) -> AppResult<String> {
        let params = self.params.clone();
        let code = code.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(code.as_str().as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| AppError::internal(format!("Failed to hash code: {}", e)))
        })
        .await
        .map_err(|e| AppError::internal(format!("Task join error: {}", e)))?
    }

    /// 校验验证码；参数取自哈希本身，摘要比较为常数时间
    pub async fn verify(&self, code: &OtpCode, hash: &str) -> AppResult<bool> {
        let params = self.params.clone();
        let code = code.clone();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AppError::internal(format!("Invalid code hash: {}", e)))?;
            Ok(Self::argon2(params)
                .verify_password(code.as_str().as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| AppError::internal(format!("Task join error: {}", e)))?
    }
}
