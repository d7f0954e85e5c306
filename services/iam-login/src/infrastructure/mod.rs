//! 基础设施层

pub mod cleanup;
pub mod observability;
pub mod persistence;
