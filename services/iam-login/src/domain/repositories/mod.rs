//! 仓储接口

mod account_repository;
mod challenge_repository;
mod request_throttle;

pub use account_repository::*;
pub use challenge_repository::*;
pub use request_throttle::*;
