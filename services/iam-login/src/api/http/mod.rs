//! HTTP 接口

pub mod dto;
pub mod middleware;
pub mod routes;

pub use routes::{AppState, router};
