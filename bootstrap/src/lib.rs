//! crm-bootstrap - 统一服务启动骨架
//!
//! 基础设施初始化、健康检查端点、运行时与优雅关闭

mod health;
mod infrastructure;
mod runtime;
mod shutdown;

pub use health::*;
pub use infrastructure::*;
pub use runtime::*;
pub use shutdown::*;
