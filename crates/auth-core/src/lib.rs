//! crm-auth-core - 认证核心库
//!
//! 令牌对签发/校验（access / refresh 通过 `purpose` 区分）、角色与权限表

mod rbac;
mod token;

pub use rbac::*;
pub use token::*;
