//! crm-cqrs-core - 命令处理抽象
//!
//! 每个用例一个 Command + 一个 CommandHandler

mod command;

pub use command::*;
