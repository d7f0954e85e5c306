//! iam-login - 手机验证码登录、令牌签发与基于角色的授权

pub mod api;
pub mod app;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use app::{Dependencies, build_state};
pub use error::{AuthError, AuthResult};
