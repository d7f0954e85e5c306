//! 持久化实现

mod memory;
mod postgres_account_repository;
mod redis_challenge_repository;

pub use memory::*;
pub use postgres_account_repository::*;
pub use redis_challenge_repository::*;

/// 账户表迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
